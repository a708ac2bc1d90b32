//! String interning with selective persistence.
//!
//! Attribute strings and file paths are stored once and referred to by
//! [`StrKey`]. Key `0` is always the empty string. Only keys that were marked
//! for saving, or that a saved node references, are written out; on load the
//! keys come back at their original indices, so node payloads stay valid
//! without remapping.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};

use crate::error::CoreError;
use crate::id::StrKey;
use crate::io::{BinaryReader, BinaryWriter, MAX_PREALLOC};

#[derive(Debug, Clone)]
pub struct StrTable {
    /// Indexed by key. `None` marks a key that was not present in a loaded file.
    strings: Vec<Option<String>>,
    map: HashMap<String, StrKey>,
    marked: BTreeSet<StrKey>,
}

impl Default for StrTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StrTable {
    /// A table holding only the empty string.
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(String::new(), StrKey::EMPTY);
        StrTable {
            strings: vec![Some(String::new())],
            map,
            marked: BTreeSet::new(),
        }
    }

    /// Interns `s`, returning the existing key if it is already present.
    pub fn intern(&mut self, s: &str) -> StrKey {
        if let Some(&key) = self.map.get(s) {
            return key;
        }
        let key = StrKey(self.strings.len() as u32);
        self.strings.push(Some(s.to_owned()));
        self.map.insert(s.to_owned(), key);
        key
    }

    /// Looks up `s` without interning it.
    pub fn get(&self, s: &str) -> Option<StrKey> {
        self.map.get(s).copied()
    }

    pub fn resolve(&self, key: StrKey) -> Option<&str> {
        self.strings.get(key.0 as usize)?.as_deref()
    }

    /// Requests that `key` be written by the next save even if no node uses it.
    pub fn mark_for_save(&mut self, key: StrKey) {
        self.marked.insert(key);
    }

    pub fn is_marked(&self, key: StrKey) -> bool {
        self.marked.contains(&key)
    }

    /// Number of resolvable strings, the empty string included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Always `false`: the empty string is never removed.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Resolvable strings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (StrKey, &str)> {
        self.strings
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|s| (StrKey(i as u32), s)))
    }

    /// Writes the marked keys plus `extra`, ascending, as
    /// `u32 count` then `(u32 key, u32 len, bytes)` records.
    ///
    /// Returns the number of records written.
    pub fn save<W: Write>(
        &self,
        w: &mut BinaryWriter<W>,
        extra: impl IntoIterator<Item = StrKey>,
    ) -> Result<usize, CoreError> {
        let keys: BTreeSet<StrKey> = self
            .marked
            .iter()
            .copied()
            .chain(extra)
            .filter(|&k| k != StrKey::EMPTY)
            .collect();

        w.write_u32(keys.len() as u32)?;
        for &key in &keys {
            let s = self
                .resolve(key)
                .ok_or_else(|| CoreError::malformed(format!("string key {key} is not interned")))?;
            w.write_u32(key.0)?;
            w.write_str(s)?;
        }
        Ok(keys.len())
    }

    /// Reads a table written by [`StrTable::save`].
    ///
    /// Keys must be strictly ascending and strings unique. Every loaded key is
    /// marked for saving so a load/save cycle preserves the table.
    pub fn load<R: Read>(r: &mut BinaryReader<R>) -> Result<StrTable, CoreError> {
        let mut table = StrTable::new();
        let count = r.read_u32()? as usize;
        table.strings.reserve(count.min(MAX_PREALLOC));

        let mut last = StrKey::EMPTY;
        for _ in 0..count {
            let key = StrKey(r.read_u32()?);
            let s = r.read_string()?;
            if key <= last {
                return Err(CoreError::malformed(format!(
                    "string key {key} out of order after {last}"
                )));
            }
            if table.map.contains_key(&s) {
                return Err(CoreError::malformed(format!("duplicate string {s:?}")));
            }
            let index = key.0 as usize;
            if table.strings.len() <= index {
                table.strings.resize(index + 1, None);
            }
            table.strings[index] = Some(s.clone());
            table.map.insert(s, key);
            table.marked.insert(key);
            last = key;
        }
        Ok(table)
    }
}
