use std::cmp::Ordering;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::OnceLock;

use ahash::RandomState;
use num_traits::{PrimInt, ToBytes};

use crate::error::Result;

/// The bundle of operations a container needs to manage its keys and values.
///
/// Every container is parameterized by one of these. Keys are stored in their owned form
/// (`Key`) but looked up through a borrowed form (`Raw`), so read-only operations never build an
/// owned key. `from_raw` is only invoked once an insert has established that the key is absent.
///
/// Implementations are stateless marker types. They must keep `compare`, `equals` and `hash`
/// consistent with each other, and `to_raw(&from_raw(r))` must compare equal to `r`. The
/// containers do not check this; an inconsistent implementation leaves them in an unspecified
/// (but memory safe) state.
pub trait Capabilities: 'static {
    type Key;
    type Value;
    type Raw<'a>: Copy
    where
        Self: 'a;

    fn compare(a: Self::Raw<'_>, b: Self::Raw<'_>) -> Ordering;

    fn hash(raw: Self::Raw<'_>) -> u64;

    fn equals(a: Self::Raw<'_>, b: Self::Raw<'_>) -> bool {
        Self::compare(a, b) == Ordering::Equal
    }

    fn to_raw(key: &Self::Key) -> Self::Raw<'_>;

    fn from_raw(raw: Self::Raw<'_>) -> Self::Key;

    /// `from_raw` for key types whose construction can run out of memory. This is what the
    /// containers call on insert; the default cannot fail.
    fn try_from_raw(raw: Self::Raw<'_>) -> Result<Self::Key> {
        Ok(Self::from_raw(raw))
    }

    fn clone_key(key: &Self::Key) -> Self::Key {
        Self::from_raw(Self::to_raw(key))
    }

    fn clone_value(value: &Self::Value) -> Self::Value;

    /// Called on every key leaving a container: erase, clear, and container teardown.
    fn destroy_key(key: Self::Key) {
        drop(key)
    }

    /// Called on every value leaving a container, including values displaced by an update.
    fn destroy_value(value: Self::Value) {
        drop(value)
    }
}

fn seeded() -> &'static RandomState {
    static STATE: OnceLock<RandomState> = OnceLock::new();
    STATE.get_or_init(|| {
        RandomState::with_seeds(
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        )
    })
}

/// Hash a byte string. Used for every byte-keyed raw form so that owned and borrowed keys agree.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    BuildHasher::hash_one(seeded(), bytes)
}

#[inline]
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    BuildHasher::hash_one(seeded(), value)
}

/// How an adapter clones and destroys its values.
///
/// Lets `ValueCaps`, `IntCaps` and `StrCaps` take values that are not `Clone`, or that need a
/// teardown hook, without writing the key half of a `Capabilities` impl by hand.
pub trait ValueOps<V>: 'static {
    fn clone_value(value: &V) -> V;

    fn destroy_value(value: V) {
        drop(value)
    }
}

/// Clone values with their own `Clone`, drop them normally.
pub struct DeepClone;

impl<V: Clone> ValueOps<V> for DeepClone {
    fn clone_value(value: &V) -> V {
        value.clone()
    }
}

/// Bitwise copy for plain `Copy` values; destroy is a no-op.
pub struct ShallowCopy;

impl<V: Copy> ValueOps<V> for ShallowCopy {
    fn clone_value(value: &V) -> V {
        *value
    }

    fn destroy_value(_: V) {}
}

/// Default capabilities for any ordered, hashable, cloneable key. Lookups borrow the key (`&K`),
/// ordering comes from `Ord`, hashing from `Hash`, and cloning is the type's own `Clone`. Values
/// are handled by `O`.
pub struct ValueCaps<K, V, O = DeepClone>(PhantomData<fn() -> (K, V, O)>);

impl<K, V, O> Capabilities for ValueCaps<K, V, O>
where
    K: Ord + Hash + Clone + 'static,
    V: 'static,
    O: ValueOps<V>,
{
    type Key = K;
    type Value = V;
    type Raw<'a> = &'a K where Self: 'a;

    fn compare(a: Self::Raw<'_>, b: Self::Raw<'_>) -> Ordering {
        a.cmp(b)
    }

    fn hash(raw: Self::Raw<'_>) -> u64 {
        hash_value(raw)
    }

    fn equals(a: Self::Raw<'_>, b: Self::Raw<'_>) -> bool {
        a == b
    }

    fn to_raw(key: &K) -> Self::Raw<'_> {
        key
    }

    fn from_raw(raw: Self::Raw<'_>) -> K {
        raw.clone()
    }

    fn clone_value(value: &V) -> V {
        O::clone_value(value)
    }

    fn destroy_value(value: V) {
        O::destroy_value(value)
    }
}

/// Capabilities for primitive integer keys, looked up by value. The hash is taken over the
/// native-endian bytes of the key.
pub struct IntCaps<K, V, O = DeepClone>(PhantomData<fn() -> (K, V, O)>);

impl<K, V, O> Capabilities for IntCaps<K, V, O>
where
    K: PrimInt + ToBytes + 'static,
    V: 'static,
    O: ValueOps<V>,
{
    type Key = K;
    type Value = V;
    type Raw<'a> = K where Self: 'a;

    fn compare(a: Self::Raw<'_>, b: Self::Raw<'_>) -> Ordering {
        a.cmp(&b)
    }

    fn hash(raw: Self::Raw<'_>) -> u64 {
        hash_bytes(raw.to_ne_bytes().as_ref())
    }

    fn equals(a: Self::Raw<'_>, b: Self::Raw<'_>) -> bool {
        a == b
    }

    fn to_raw(key: &K) -> Self::Raw<'_> {
        *key
    }

    fn from_raw(raw: Self::Raw<'_>) -> K {
        raw
    }

    fn clone_value(value: &V) -> V {
        O::clone_value(value)
    }

    fn destroy_value(value: V) {
        O::destroy_value(value)
    }
}
