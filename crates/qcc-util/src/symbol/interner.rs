//! Global string table backing [`Symbol`](super::Symbol).
//!
//! The table is a lock-free map from string to index plus an append-only
//! reverse vector for index-to-string resolution. Strings are leaked to
//! `'static` on first interning so handles never dangle.

use ahash::RandomState;
use dashmap::DashMap;
use std::sync::{OnceLock, RwLock};

use super::Symbol;

pub(super) struct StringTable {
    map: DashMap<&'static str, u32, RandomState>,
    strings: RwLock<Vec<&'static str>>,
}

impl StringTable {
    fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            strings: RwLock::new(Vec::new()),
        }
    }

    pub(super) fn intern(&self, string: &str) -> Symbol {
        // Fast path: already interned.
        if let Some(entry) = self.map.get(string) {
            return Symbol::from_index(*entry.value());
        }

        // Slow path: take the append lock and re-check, so two racing
        // threads interning the same new string agree on one index.
        let mut strings = self.strings.write().expect("interner lock poisoned");
        if let Some(entry) = self.map.get(string) {
            return Symbol::from_index(*entry.value());
        }

        let interned: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = strings.len() as u32;
        strings.push(interned);
        self.map.insert(interned, index);
        Symbol::from_index(index)
    }

    pub(super) fn resolve(&self, index: u32) -> &'static str {
        let strings = self.strings.read().expect("interner lock poisoned");
        strings
            .get(index as usize)
            .copied()
            .unwrap_or("<unknown symbol>")
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.strings.read().expect("interner lock poisoned").len()
    }
}

pub(super) fn string_table() -> &'static StringTable {
    static TABLE: OnceLock<StringTable> = OnceLock::new();
    TABLE.get_or_init(StringTable::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_grows_monotonically() {
        let before = string_table().len();
        let _ = string_table().intern("interner_growth_probe");
        let _ = string_table().intern("interner_growth_probe");
        let after = string_table().len();
        assert!(after >= before + 1);
    }

    #[test]
    fn test_resolve_unknown_index() {
        assert_eq!(string_table().resolve(u32::MAX), "<unknown symbol>");
    }
}
