use std::fmt;

use memchr::memmem;

use crate::strings::sso::SsoString;

/// A borrowed run of bytes: a pointer and a length into memory somebody else owns.
///
/// Views are plain values. Copying one never copies the bytes, and equality, ordering and hashing
/// all look at the bytes rather than at where they live. Positions are byte offsets; nothing here
/// knows about UTF-8 beyond the lossy `Display` impl.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct View<'a> {
    data: &'a [u8],
}

impl<'a> View<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    #[inline]
    pub const fn from_str(s: &'a str) -> Self {
        Self { data: s.as_bytes() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn front(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn back(&self) -> Option<u8> {
        self.data.last().copied()
    }

    pub fn clear(&mut self) {
        self.data = &self.data[..0];
    }

    pub fn bytes(&self) -> std::slice::Iter<'a, u8> {
        self.data.iter()
    }

    /// `n` bytes starting at `pos`. A negative `pos` counts back from the end. Both are clamped,
    /// so a start past the end yields an empty view at the end.
    pub fn substr(&self, pos: isize, n: usize) -> View<'a> {
        let start = self.resolve(pos);
        let n = n.min(self.len() - start);
        View::new(&self.data[start..start + n])
    }

    /// Bytes in `[p1, p2)`. Negative positions count back from the end; `p2 <= p1` after
    /// resolution yields an empty view.
    pub fn slice(&self, p1: isize, p2: isize) -> View<'a> {
        let start = self.resolve(p1);
        let end = self.resolve(p2);
        if end <= start {
            return View::new(&self.data[start..start]);
        }
        View::new(&self.data[start..end])
    }

    fn resolve(&self, pos: isize) -> usize {
        let len = self.len();
        if pos < 0 {
            len.saturating_sub(pos.unsigned_abs())
        } else {
            (pos as usize).min(len)
        }
    }

    pub fn find(&self, needle: View<'_>) -> Option<usize> {
        memmem::find(self.data, needle.data)
    }

    pub fn contains(&self, needle: View<'_>) -> bool {
        self.find(needle).is_some()
    }

    pub fn starts_with(&self, sub: View<'_>) -> bool {
        self.data.starts_with(sub.data)
    }

    pub fn ends_with(&self, sub: View<'_>) -> bool {
        self.data.ends_with(sub.data)
    }

    pub fn equals(&self, other: View<'_>) -> bool {
        self.data == other.data
    }

    /// The zero-length view sitting just past the last byte.
    pub fn end(&self) -> View<'a> {
        View::new(&self.data[self.len()..])
    }

    /// Byte offset of this view inside `whole`, if it was carved out of it.
    pub fn offset_in(&self, whole: View<'_>) -> Option<usize> {
        let base = whole.data.as_ptr() as usize;
        let ptr = self.data.as_ptr() as usize;
        let offset = ptr.checked_sub(base)?;
        if offset + self.len() <= whole.len() {
            Some(offset)
        } else {
            None
        }
    }

    /// Everything up to (not including) the first `sep`, or the whole view if there is none.
    /// An empty separator never matches.
    pub fn first_token(&self, sep: View<'_>) -> View<'a> {
        let n = find_sep(self.data, sep).unwrap_or(self.len());
        View::new(&self.data[..n])
    }

    /// The token following `prev`, which must have come from `first_token`/`next_token` on this
    /// same view. Once `prev` reaches the end, returns the empty view positioned at the end; since
    /// tokens can legitimately be empty, the end is detected by position, not by length.
    pub fn next_token(&self, sep: View<'_>, prev: View<'a>) -> View<'a> {
        let Some(offset) = prev.offset_in(*self) else {
            return self.end();
        };
        let prev_end = offset + prev.len();
        if prev_end >= self.len() {
            return self.end();
        }
        let start = (prev_end + sep.len()).min(self.len());
        let rest = &self.data[start..];
        let n = find_sep(rest, sep).unwrap_or(rest.len());
        View::new(&rest[..n])
    }

    /// Iterate the `sep`-separated tokens, empty ones included.
    pub fn tokens<'s>(&self, sep: View<'s>) -> Tokens<'a, 's> {
        Tokens {
            whole: *self,
            sep,
            prev: None,
            done: false,
        }
    }

    /// Copy the bytes into an owned string.
    pub fn to_owned_string(&self) -> SsoString {
        SsoString::from_view(*self)
    }

    pub fn to_str_lossy(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.data)
    }
}

fn find_sep(hay: &[u8], sep: View<'_>) -> Option<usize> {
    if sep.is_empty() {
        return None;
    }
    memmem::find(hay, sep.data)
}

/// Iterator over the tokens of a view, driven by `first_token` / `next_token`.
pub struct Tokens<'a, 's> {
    whole: View<'a>,
    sep: View<'s>,
    prev: Option<View<'a>>,
    done: bool,
}

impl<'a, 's> Iterator for Tokens<'a, 's> {
    type Item = View<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tok = match self.prev {
            None => self.whole.first_token(self.sep),
            Some(prev) => self.whole.next_token(self.sep, prev),
        };
        let tok_end = tok.offset_in(self.whole).map(|o| o + tok.len());
        if tok_end.map_or(true, |end| end >= self.whole.len()) {
            self.done = true;
        }
        self.prev = Some(tok);
        Some(tok)
    }
}

impl<'a> From<&'a [u8]> for View<'a> {
    fn from(data: &'a [u8]) -> Self {
        View::new(data)
    }
}

impl<'a> From<&'a str> for View<'a> {
    fn from(s: &'a str) -> Self {
        View::from_str(s)
    }
}

impl PartialEq<str> for View<'_> {
    fn eq(&self, other: &str) -> bool {
        self.data == other.as_bytes()
    }
}

impl PartialEq<&str> for View<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.data == other.as_bytes()
    }
}

impl PartialEq<[u8]> for View<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.data == other
    }
}

impl AsRef<[u8]> for View<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

impl fmt::Display for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}
