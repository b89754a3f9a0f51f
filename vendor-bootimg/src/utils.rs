use crate::error::{Error, Result};
use bytemuck::{Pod, pod_read_unaligned};
use itertools::Itertools;
use std::borrow::Cow;
use std::fmt::{Debug, Display, LowerHex};

pub fn align_to<N: num_traits::PrimInt + Display + Debug + LowerHex>(num: N, alignment: N) -> N {
    let one = N::one();
    assert_eq!(
        alignment & (alignment - one),
        N::zero(),
        "invalid alignment 0x{:x}",
        alignment
    );
    (num + alignment - one) & !(alignment - one)
}

pub trait SliceExt {
    fn u32_at(&self, offset: usize) -> Option<u32>;
}

impl SliceExt for [u8] {
    fn u32_at(&self, offset: usize) -> Option<u32> {
        self.get(offset..offset.checked_add(4)?)
            .map(|data| u32::from_le(pod_read_unaligned(data)))
    }
}

/// Strips trailing NUL padding. Interior NULs are kept.
pub fn trim_nul_end(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &data[..end]
}

/// NUL-trimmed text with invalid sequences replaced.
pub fn lossy_text(data: &[u8]) -> String {
    String::from_utf8_lossy(trim_nul_end(data)).into_owned()
}

pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).join("")
}

/// Forward-only reader over a byte slice that refuses to read past the end.
///
/// Every read names the field it is decoding so that a short buffer surfaces
/// as [`Error::Truncated`] pointing at the exact field and offset.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Truncated {
                field,
                offset: self.pos,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_pod<F: Pod>(&mut self, field: &'static str) -> Result<F> {
        Ok(pod_read_unaligned(self.take(size_of::<F>(), field)?))
    }

    pub fn u32_le(&mut self, field: &'static str) -> Result<u32> {
        self.read_pod::<u32>(field).map(u32::from_le)
    }

    pub fn u64_le(&mut self, field: &'static str) -> Result<u64> {
        self.read_pod::<u64>(field).map(u64::from_le)
    }

    pub fn text(&mut self, len: usize, field: &'static str) -> Result<String> {
        self.take(len, field).map(lossy_text)
    }
}

/// Lexically normalizes an archive member name into a path relative to the
/// extraction root. Leading separators, `.` and empty components are dropped
/// and `..` never climbs above the root.
pub fn norm_path(path: &str) -> Cow<'_, str> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    let normalized: String = Itertools::intersperse(parts.into_iter(), "/").collect();
    if normalized == path {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(normalized)
    }
}
