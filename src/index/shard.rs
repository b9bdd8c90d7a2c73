//! Shard keys for the reverse-dependency index.

use std::fmt;

use crate::model::PackageName;

/// First character class of a normalized name: `a`–`z`, `0-9`, or `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShardKey {
    /// Lowercase ASCII letter, stored as its offset from `b'a'`.
    Letter(u8),
    Digit,
    Other,
}

impl ShardKey {
    pub const COUNT: usize = 28;

    pub fn of(name: &PackageName) -> Self {
        match name.first_char() {
            Some(c @ 'a'..='z') => ShardKey::Letter(c as u8 - b'a'),
            Some('0'..='9') => ShardKey::Digit,
            _ => ShardKey::Other,
        }
    }

    /// Dense index in `0..COUNT`.
    pub fn index(self) -> usize {
        match self {
            ShardKey::Letter(offset) => offset as usize,
            ShardKey::Digit => 26,
            ShardKey::Other => 27,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0..=25 => Some(ShardKey::Letter(index as u8)),
            26 => Some(ShardKey::Digit),
            27 => Some(ShardKey::Other),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = ShardKey> {
        (0..Self::COUNT).filter_map(Self::from_index)
    }

    /// Record name on disk: `a`…`z`, `0-9`, `other`.
    pub fn file_stem(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardKey::Letter(offset) => write!(f, "{}", (b'a' + offset) as char),
            ShardKey::Digit => f.write_str("0-9"),
            ShardKey::Other => f.write_str("other"),
        }
    }
}
