use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::aatree::AaTreeMap;
use crate::caps::{hash_bytes, Capabilities, DeepClone, ValueOps};
use crate::error::Result;
use crate::probe::ProbeHashMap;
use crate::set::{AaTreeSet, ProbeHashSet};
use crate::strings::sso::SsoString;
use crate::strings::view::View;

/// Binds `SsoString` keys to `View` lookups: a string-keyed container is searched with borrowed
/// views, and an owned key is only built (by copying the view) when an insert needs one. Values
/// are cloned and destroyed through `O`.
pub struct StrCaps<V, O = DeepClone>(PhantomData<fn() -> (V, O)>);

impl<V: 'static, O: ValueOps<V>> Capabilities for StrCaps<V, O> {
    type Key = SsoString;
    type Value = V;
    type Raw<'a> = View<'a> where Self: 'a;

    fn compare(a: Self::Raw<'_>, b: Self::Raw<'_>) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }

    fn hash(raw: Self::Raw<'_>) -> u64 {
        hash_bytes(raw.as_bytes())
    }

    fn equals(a: Self::Raw<'_>, b: Self::Raw<'_>) -> bool {
        a.equals(b)
    }

    fn to_raw(key: &SsoString) -> Self::Raw<'_> {
        key.view()
    }

    fn from_raw(raw: Self::Raw<'_>) -> SsoString {
        SsoString::from_view(raw)
    }

    fn try_from_raw(raw: Self::Raw<'_>) -> Result<SsoString> {
        SsoString::try_from_view(raw)
    }

    fn clone_key(key: &SsoString) -> SsoString {
        key.clone()
    }

    fn clone_value(value: &V) -> V {
        O::clone_value(value)
    }

    fn destroy_value(value: V) {
        O::destroy_value(value)
    }
}

/// Sorted map from owned strings, looked up by view.
pub type StrMap<V, O = DeepClone> = AaTreeMap<StrCaps<V, O>>;
/// Sorted set of owned strings, looked up by view.
pub type StrSet = AaTreeSet<StrCaps<()>>;
/// Hash map from owned strings, looked up by view.
pub type StrHashMap<V, O = DeepClone> = ProbeHashMap<StrCaps<V, O>>;
/// Hash set of owned strings, looked up by view.
pub type StrHashSet = ProbeHashSet<StrCaps<()>>;
