//! Generic associative containers driven by a capability set.
//!
//! A container never inspects its keys directly. Ordering, hashing, equality, cloning and
//! destruction all come from a [`Capabilities`] implementation, which also fixes the borrowed
//! `Raw` form that lookups take. Two families are provided: [`AaTreeMap`] (ordered, an AA-tree
//! over an index arena) and [`ProbeHashMap`] (unordered, linear probing with backward-shift
//! deletion), plus set wrappers over each. The `strings` module binds them to an owned
//! small-string type looked up through borrowed byte views.

pub mod aatree;
pub mod caps;
pub mod error;
pub mod probe;
pub mod set;
pub mod strings;
pub mod utils;

pub use aatree::{AaTreeMap, TreeStats};
pub use caps::{
    hash_bytes, hash_value, Capabilities, DeepClone, IntCaps, ShallowCopy, ValueCaps, ValueOps,
};
pub use error::{AssocError, Result};
pub use probe::{ProbeHashMap, ProbeStats};
pub use set::{AaTreeSet, ProbeHashSet};
pub use strings::caps::{StrCaps, StrHashMap, StrHashSet, StrMap, StrSet};
pub use strings::sso::{SsoString, INLINE_CAPACITY};
pub use strings::view::View;
