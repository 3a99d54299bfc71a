use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use memchr::memmem;

use crate::error::{AssocError, Result};
use crate::strings::view::View;

/// Strings up to this many bytes live inside the struct itself, with no heap allocation.
pub const INLINE_CAPACITY: usize = 23;

#[derive(Clone)]
enum Repr {
    Inline { len: u8, buf: [u8; INLINE_CAPACITY] },
    Heap(Vec<u8>),
}

/// An owned byte string with small-string optimization.
///
/// Contents up to `INLINE_CAPACITY` bytes are stored inline; anything longer moves to a heap
/// buffer, which is kept (not shrunk back) until `shrink_to_fit`. The string converts to a
/// [`View`] in O(1), and every editing operation works on explicit byte offsets. Embedded zero
/// bytes are ordinary content.
#[derive(Clone)]
pub struct SsoString {
    repr: Repr,
}

impl SsoString {
    pub const fn new() -> Self {
        Self {
            repr: Repr::Inline {
                len: 0,
                buf: [0; INLINE_CAPACITY],
            },
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        if capacity <= INLINE_CAPACITY {
            Self::new()
        } else {
            Self {
                repr: Repr::Heap(Vec::with_capacity(capacity)),
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() <= INLINE_CAPACITY {
            let mut buf = [0; INLINE_CAPACITY];
            buf[..bytes.len()].copy_from_slice(bytes);
            Self {
                repr: Repr::Inline {
                    len: bytes.len() as u8,
                    buf,
                },
            }
        } else {
            Self {
                repr: Repr::Heap(bytes.to_vec()),
            }
        }
    }

    pub fn from_view(view: View<'_>) -> Self {
        Self::from_bytes(view.as_bytes())
    }

    /// Like `from_bytes`, but reports a failed heap allocation instead of aborting.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= INLINE_CAPACITY {
            return Ok(Self::from_bytes(bytes));
        }
        let mut v = Vec::new();
        v.try_reserve_exact(bytes.len())
            .map_err(|e| AssocError::allocation(bytes.len(), e))?;
        v.extend_from_slice(bytes);
        Ok(Self {
            repr: Repr::Heap(v),
        })
    }

    pub fn try_from_view(view: View<'_>) -> Result<Self> {
        Self::try_from_bytes(view.as_bytes())
    }

    /// Build a copy of `src` with every non-overlapping occurrence of `find` replaced by
    /// `replacement`. Scanning resumes after each match; an empty `find` matches nothing.
    pub fn from_replace_all(src: View<'_>, find: View<'_>, replacement: View<'_>) -> Self {
        let src = src.as_bytes();
        let mut out = Self::new();
        let mut from = 0;
        if !find.is_empty() {
            let finder = memmem::Finder::new(find.as_bytes());
            while let Some(pos) = finder.find(&src[from..]) {
                out.append(&src[from..from + pos]);
                out.append(replacement.as_bytes());
                from += pos + find.len();
            }
        }
        out.append(&src[from..]);
        out
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Inline { len, buf } => &buf[..*len as usize],
            Repr::Heap(v) => v.as_slice(),
        }
    }

    #[inline]
    pub fn view(&self) -> View<'_> {
        View::new(self.as_bytes())
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Inline { len, .. } => *len as usize,
            Repr::Heap(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match &self.repr {
            Repr::Inline { .. } => INLINE_CAPACITY,
            Repr::Heap(v) => v.capacity(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline { .. })
    }

    pub fn reserve(&mut self, additional: usize) {
        let needed = self.len() + additional;
        if needed <= self.capacity() {
            return;
        }
        self.spill(needed);
    }

    /// Like `reserve`, but reports allocation failure instead of aborting. The string is
    /// unchanged on failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let len = self.len();
        let needed = len
            .checked_add(additional)
            .ok_or_else(|| AssocError::overflow(additional))?;
        if needed <= self.capacity() {
            return Ok(());
        }
        match &mut self.repr {
            Repr::Heap(v) => v
                .try_reserve(additional)
                .map_err(|e| AssocError::allocation(additional, e)),
            Repr::Inline { len, buf } => {
                let mut v = Vec::new();
                v.try_reserve(needed)
                    .map_err(|e| AssocError::allocation(needed, e))?;
                v.extend_from_slice(&buf[..*len as usize]);
                self.repr = Repr::Heap(v);
                Ok(())
            }
        }
    }

    pub fn shrink_to_fit(&mut self) {
        if let Repr::Heap(v) = &mut self.repr {
            if v.len() <= INLINE_CAPACITY {
                *self = Self::from_bytes(v);
            } else {
                v.shrink_to_fit();
            }
        }
    }

    pub fn clear(&mut self) {
        match &mut self.repr {
            Repr::Inline { len, .. } => *len = 0,
            Repr::Heap(v) => v.clear(),
        }
    }

    pub fn assign(&mut self, bytes: &[u8]) -> &mut Self {
        let len = self.len();
        self.replace(0, len, bytes);
        self
    }

    pub fn assign_view(&mut self, view: View<'_>) -> &mut Self {
        self.assign(view.as_bytes())
    }

    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        let len = self.len();
        self.replace(len, 0, bytes);
        self
    }

    pub fn append_view(&mut self, view: View<'_>) -> &mut Self {
        self.append(view.as_bytes())
    }

    pub fn push(&mut self, byte: u8) {
        self.append(&[byte]);
    }

    pub fn insert(&mut self, pos: usize, bytes: &[u8]) {
        self.replace(pos, 0, bytes);
    }

    pub fn insert_view(&mut self, pos: usize, view: View<'_>) {
        self.replace(pos, 0, view.as_bytes());
    }

    pub fn erase(&mut self, pos: usize, len: usize) {
        self.replace(pos, len, &[]);
    }

    pub fn replace_view(&mut self, pos: usize, len: usize, view: View<'_>) {
        self.replace(pos, len, view.as_bytes());
    }

    /// Replace the `len` bytes at `pos` with `bytes`. Both `pos` and `len` are clamped to the
    /// current contents.
    pub fn replace(&mut self, pos: usize, len: usize, bytes: &[u8]) {
        let old_len = self.len();
        let pos = pos.min(old_len);
        let len = len.min(old_len - pos);
        let new_len = old_len - len + bytes.len();

        match &mut self.repr {
            Repr::Inline { len: cur, buf } if new_len <= INLINE_CAPACITY => {
                buf.copy_within(pos + len..old_len, pos + bytes.len());
                buf[pos..pos + bytes.len()].copy_from_slice(bytes);
                *cur = new_len as u8;
            }
            Repr::Inline { buf, .. } => {
                let mut v = Vec::with_capacity(new_len.max(2 * INLINE_CAPACITY));
                v.extend_from_slice(&buf[..pos]);
                v.extend_from_slice(bytes);
                v.extend_from_slice(&buf[pos + len..old_len]);
                self.repr = Repr::Heap(v);
            }
            Repr::Heap(v) => {
                v.splice(pos..pos + len, bytes.iter().copied());
            }
        }
    }

    /// Replace every non-overlapping occurrence of `find` with `replacement`, in place.
    pub fn replace_all(&mut self, find: View<'_>, replacement: View<'_>) {
        let out = Self::from_replace_all(self.view(), find, replacement);
        *self = out;
    }

    pub fn substr(&self, pos: isize, n: usize) -> View<'_> {
        self.view().substr(pos, n)
    }

    pub fn slice(&self, p1: isize, p2: isize) -> View<'_> {
        self.view().slice(p1, p2)
    }

    pub fn find(&self, needle: View<'_>) -> Option<usize> {
        self.view().find(needle)
    }

    pub fn contains(&self, needle: View<'_>) -> bool {
        self.view().contains(needle)
    }

    pub fn starts_with(&self, sub: View<'_>) -> bool {
        self.view().starts_with(sub)
    }

    pub fn ends_with(&self, sub: View<'_>) -> bool {
        self.view().ends_with(sub)
    }

    pub fn equals(&self, other: View<'_>) -> bool {
        self.view().equals(other)
    }

    fn spill(&mut self, capacity: usize) {
        match &mut self.repr {
            Repr::Heap(v) => v.reserve(capacity - v.len()),
            Repr::Inline { len, buf } => {
                let mut v = Vec::with_capacity(capacity);
                v.extend_from_slice(&buf[..*len as usize]);
                self.repr = Repr::Heap(v);
            }
        }
    }
}

impl Default for SsoString {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SsoString {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for SsoString {}

impl PartialOrd for SsoString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SsoString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

// Must agree with View's derived Hash, which hashes the same byte slice.
impl Hash for SsoString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl PartialEq<View<'_>> for SsoString {
    fn eq(&self, other: &View<'_>) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<SsoString> for View<'_> {
    fn eq(&self, other: &SsoString) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<str> for SsoString {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for SsoString {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for SsoString {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl AsRef<[u8]> for SsoString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&str> for SsoString {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl From<&[u8]> for SsoString {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<View<'_>> for SsoString {
    fn from(view: View<'_>) -> Self {
        Self::from_view(view)
    }
}

impl From<String> for SsoString {
    fn from(s: String) -> Self {
        if s.len() <= INLINE_CAPACITY {
            Self::from_bytes(s.as_bytes())
        } else {
            Self {
                repr: Repr::Heap(s.into_bytes()),
            }
        }
    }
}

impl fmt::Display for SsoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.view(), f)
    }
}

impl fmt::Debug for SsoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.view(), f)
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use crate::strings::sso::{SsoString, INLINE_CAPACITY};
    use crate::strings::view::View;

    #[test]
    fn test_inline_and_heap() {
        let s = SsoString::from("short");
        assert!(s.is_inline());
        assert_eq!(s, "short");

        let long = "x".repeat(INLINE_CAPACITY + 1);
        let s = SsoString::from(long.as_str());
        assert!(!s.is_inline());
        assert_eq!(s.len(), INLINE_CAPACITY + 1);

        let exact = "y".repeat(INLINE_CAPACITY);
        assert!(SsoString::from(exact.as_str()).is_inline());
    }

    #[test]
    fn test_view_round_trip() {
        for text in ["", "a", "hello world", "a much longer string that lives on the heap"] {
            let s = SsoString::from(text);
            let v = s.view();
            assert_eq!(v.as_bytes(), text.as_bytes());
            let back = SsoString::from_view(v);
            assert_eq!(back, s);
            assert_eq!(back.as_bytes(), s.as_bytes());
        }
    }

    #[test]
    fn test_append_grows_to_heap() {
        let mut s = SsoString::new();
        let mut expected = String::new();
        for i in 0..20 {
            s.append(format!("{i}-").as_bytes());
            expected.push_str(&format!("{i}-"));
            assert_eq!(s.is_inline(), expected.len() <= INLINE_CAPACITY);
        }
        assert_eq!(s, expected.as_str());
        assert!(!s.is_inline());
        s.erase(2, 100);
        assert_eq!(s, "0-");
        assert!(!s.is_inline());
        s.shrink_to_fit();
        assert!(s.is_inline());
        assert_eq!(s, "0-");
    }

    #[test]
    fn test_insert_replace_erase() {
        let mut s = SsoString::from("hello world");
        s.insert(5, b",");
        assert_eq!(s, "hello, world");
        s.replace(7, 5, b"there");
        assert_eq!(s, "hello, there");
        s.replace_view(0, 5, View::from("goodbye"));
        assert_eq!(s, "goodbye, there");
        s.erase(7, 2);
        assert_eq!(s, "goodbyethere");
        // Out of range positions clamp to the end.
        s.insert(100, b"!");
        assert_eq!(s, "goodbyethere!");
        s.erase(100, 5);
        assert_eq!(s, "goodbyethere!");
        s.assign_view(View::from("fresh"));
        assert_eq!(s, "fresh");
    }

    #[test]
    fn test_embedded_zero() {
        let mut s = SsoString::from_bytes(&[b'a', 0, b'b']);
        assert_eq!(s.len(), 3);
        s.append(&[0]);
        assert_eq!(s.as_bytes(), &[b'a', 0, b'b', 0]);
        assert_eq!(s.find(View::new(&[0])), Some(1));
    }

    #[test]
    fn test_replace_all() {
        let out = SsoString::from_replace_all("ababab".into(), "ab".into(), "x".into());
        assert_eq!(out, "xxx");

        let mut s = SsoString::from("one two two three two");
        s.replace_all("two".into(), "2".into());
        assert_eq!(s, "one 2 2 three 2");

        // Non-overlapping: "aaa" with "aa" replaces only the first pair.
        let out = SsoString::from_replace_all("aaa".into(), "aa".into(), "b".into());
        assert_eq!(out, "ba");

        let out = SsoString::from_replace_all("abc".into(), "".into(), "zzz".into());
        assert_eq!(out, "abc");

        let out = SsoString::from_replace_all("abc".into(), "c".into(), "".into());
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_search_delegates() {
        let s = SsoString::from("prefix-body-suffix");
        assert!(s.starts_with("prefix".into()));
        assert!(s.ends_with("suffix".into()));
        assert!(s.contains("body".into()));
        assert_eq!(s.find("-".into()), Some(6));
        assert_eq!(s.substr(-6, 10), "suffix");
        assert_eq!(s.slice(7, 11), "body");
        assert!(s.equals("prefix-body-suffix".into()));
    }

    #[test]
    fn test_try_reserve() {
        let mut s = SsoString::from("abc");
        s.try_reserve(10).unwrap();
        assert!(s.is_inline());
        s.try_reserve(100).unwrap();
        assert!(!s.is_inline());
        assert!(s.capacity() >= 103);
        assert_eq!(s, "abc");
        assert!(s.try_reserve(usize::MAX).is_err());
        assert_eq!(s, "abc");
    }

    #[test]
    fn test_try_from_bytes() {
        let short = SsoString::try_from_bytes(b"tiny").unwrap();
        assert!(short.is_inline());
        assert_eq!(short, "tiny");

        let text = "z".repeat(INLINE_CAPACITY * 3);
        let long = SsoString::try_from_view(View::from(text.as_str())).unwrap();
        assert!(!long.is_inline());
        assert!(long.capacity() >= text.len());
        assert_eq!(long, SsoString::from(text.as_str()));
    }

    #[test]
    fn test_ordering_and_hash_agree_with_view() {
        use crate::caps::hash_value;
        let a = SsoString::from("apple");
        let b = SsoString::from("banana");
        assert!(a < b);
        assert_eq!(hash_value(&a), hash_value(&a.view()));
    }

    // Random edits checked against a Vec<u8> doing the same thing.
    #[test]
    fn test_random_edits() {
        let mut rng = thread_rng();
        let mut s = SsoString::new();
        let mut shadow: Vec<u8> = vec![];
        for _ in 0..2000 {
            let n = rng.gen_range(0..8);
            let bytes: Vec<u8> = (0..n).map(|_| rng.gen_range(b'a'..=b'e')).collect();
            let pos = rng.gen_range(0..=shadow.len());
            let len = rng.gen_range(0..=shadow.len() - pos).min(6);
            s.replace(pos, len, &bytes);
            shadow.splice(pos..pos + len, bytes.iter().copied());
            assert_eq!(s.as_bytes(), shadow.as_slice());
            if shadow.len() > 60 {
                s.clear();
                shadow.clear();
            }
        }
    }
}
