//! Mode flags tracked per target.

use std::collections::BTreeSet;

/// The set of single-character modes held by a nick or channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeStore {
    modes: BTreeSet<char>,
}

impl ModeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `mode` is set.
    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.contains(&mode)
    }

    /// Sets `mode`.
    pub fn add_mode(&mut self, mode: char) {
        self.modes.insert(mode);
    }

    /// Clears `mode`.
    pub fn remove_mode(&mut self, mode: char) {
        self.modes.remove(&mode);
    }

    /// Applies a mode string such as `+ov-i`.
    ///
    /// Characters are added until a `-` is seen and removed until the next
    /// `+`. A string without a leading sign adds.
    pub fn apply(&mut self, mode_string: &str) {
        let mut adding = true;
        for c in mode_string.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                c if adding => self.add_mode(c),
                c => self.remove_mode(c),
            }
        }
    }

    /// Iterates the set modes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.modes.iter().copied()
    }

    /// Number of set modes.
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Returns `true` if no mode is set.
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

impl std::fmt::Display for ModeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+")?;
        self.modes.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_remove() {
        let mut store = ModeStore::new();
        store.apply("+ov");
        store.apply("-o");
        assert_eq!(store.iter().collect::<Vec<_>>(), vec!['v']);
    }

    #[test]
    fn test_mixed_polarity() {
        let mut store = ModeStore::new();
        store.apply("iw");
        store.apply("+x-i+Z");
        assert!(!store.has_mode('i'));
        assert!(store.has_mode('w') && store.has_mode('x') && store.has_mode('Z'));
        assert_eq!(store.to_string(), "+Zwx");

        store.apply("-abc");
        assert_eq!(store.len(), 3);
    }
}
