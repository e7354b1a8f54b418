//! Column aliases that fit the database's identifier limit.

use std::collections::HashSet;

/// Hands out unique column aliases no longer than the dialect allows.
///
/// A name that is too long is cut; a name already taken (compared
/// case-insensitively) gets a `_0`, `_1`, ... suffix, cutting the name
/// further so the suffix still fits.
#[derive(Debug, Clone)]
pub struct AliasAllocator {
    max_len: usize,
    used: HashSet<String>,
}

fn truncate(name: &str, max_chars: usize) -> &str {
    match name.char_indices().nth(max_chars) {
        Some((i, _)) => &name[..i],
        None => name,
    }
}

impl AliasAllocator {
    /// `max_len` of 0 means no limit.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: if max_len == 0 { usize::MAX } else { max_len },
            used: HashSet::new(),
        }
    }

    pub fn allocate(&mut self, name: &str) -> String {
        let candidate = truncate(name, self.max_len).to_string();
        if self.used.insert(candidate.to_lowercase()) {
            return candidate;
        }
        let mut n = 0usize;
        loop {
            let suffix = format!("_{n}");
            let room = self.max_len.saturating_sub(suffix.chars().count());
            let candidate = format!("{}{suffix}", truncate(name, room));
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
