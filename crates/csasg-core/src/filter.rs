//! Visibility overlay over the node arena.
//!
//! One [`FilterState`] per arena slot plus a global on/off switch. Filtering
//! never removes data: it only changes what filtered iteration and the
//! filtered walker report. The switch lives in a `Cell` so a scoped
//! [`FilterGuard`] can turn it off through a shared borrow.

use std::cell::Cell;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, FormatError};
use crate::id::NodeId;
use crate::io::{BinaryReader, BinaryWriter, MAX_PREALLOC};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterState {
    Filtered,
    NotFiltered,
}

impl FilterState {
    /// On-disk encoding: `0` = Filtered, `1` = NotFiltered.
    pub fn to_byte(self) -> u8 {
        match self {
            FilterState::Filtered => 0,
            FilterState::NotFiltered => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<FilterState> {
        match byte {
            0 => Some(FilterState::Filtered),
            1 => Some(FilterState::NotFiltered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    states: Vec<FilterState>,
    on: Cell<bool>,
}

impl Filter {
    /// `len` NotFiltered slots, switch on.
    pub fn new(len: usize) -> Self {
        Filter {
            states: vec![FilterState::NotFiltered; len],
            on: Cell::new(true),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }

    pub fn set_on(&self, on: bool) {
        self.on.set(on);
    }

    /// Turns the switch off until the returned guard is dropped.
    pub fn turn_off_scoped(&self) -> FilterGuard<'_> {
        FilterGuard::new(&self.on)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, id: NodeId) -> Result<FilterState, CoreError> {
        self.states
            .get(id.index())
            .copied()
            .ok_or(CoreError::InvalidNodeId { id })
    }

    /// Stored state reported through the switch: always `false` while off.
    pub fn is_filtered(&self, id: NodeId) -> Result<bool, CoreError> {
        let state = self.state(id)?;
        Ok(self.is_on() && state == FilterState::Filtered)
    }

    pub fn set(&mut self, id: NodeId, state: FilterState) -> Result<(), CoreError> {
        let slot = self
            .states
            .get_mut(id.index())
            .ok_or(CoreError::InvalidNodeId { id })?;
        *slot = state;
        Ok(())
    }

    /// Grows to `len` with NotFiltered slots. Never shrinks.
    pub fn resize_to(&mut self, len: usize) {
        if len > self.states.len() {
            self.states.resize(len, FilterState::NotFiltered);
        }
    }

    /// Marks every slot NotFiltered.
    pub fn initialize(&mut self) {
        self.states.fill(FilterState::NotFiltered);
    }

    pub fn filtered_count(&self) -> usize {
        self.states
            .iter()
            .filter(|&&s| s == FilterState::Filtered)
            .count()
    }

    /// Writes the first `len` slots as `u32 count` plus one byte each.
    pub fn save<W: Write>(&self, w: &mut BinaryWriter<W>, len: usize) -> Result<(), CoreError> {
        let len = len.min(self.states.len());
        w.write_u32(len as u32)?;
        for state in &self.states[..len] {
            w.write_u8(state.to_byte())?;
        }
        Ok(())
    }

    /// Replaces the states with a saved vector of exactly `expected` slots.
    ///
    /// On error the current states are left untouched.
    pub fn load<R: Read>(
        &mut self,
        r: &mut BinaryReader<R>,
        expected: usize,
    ) -> Result<(), CoreError> {
        let count = r.read_u32()?;
        if count as usize != expected {
            return Err(FormatError::CountMismatch {
                expected: expected as u64,
                found: u64::from(count),
            }
            .into());
        }
        let mut states = Vec::with_capacity(expected.min(MAX_PREALLOC));
        for _ in 0..count {
            let byte = r.read_u8()?;
            let state = FilterState::from_byte(byte)
                .ok_or_else(|| CoreError::malformed(format!("invalid filter byte {byte}")))?;
            states.push(state);
        }
        self.states = states;
        Ok(())
    }
}

/// Restores the filter switch to its previous value when dropped.
#[must_use = "the filter turns back on as soon as the guard is dropped"]
pub struct FilterGuard<'a> {
    switch: &'a Cell<bool>,
    previous: bool,
}

impl<'a> FilterGuard<'a> {
    fn new(switch: &'a Cell<bool>) -> Self {
        let previous = switch.replace(false);
        FilterGuard { switch, previous }
    }
}

impl Drop for FilterGuard<'_> {
    fn drop(&mut self) {
        self.switch.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_masks_states() {
        let mut filter = Filter::new(3);
        filter.set(NodeId(1), FilterState::Filtered).unwrap();
        assert!(filter.is_filtered(NodeId(1)).unwrap());
        filter.set_on(false);
        assert!(!filter.is_filtered(NodeId(1)).unwrap());
        assert_eq!(filter.state(NodeId(1)).unwrap(), FilterState::Filtered);
        assert!(matches!(
            filter.is_filtered(NodeId(3)),
            Err(CoreError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn guard_restores_previous_value() {
        let filter = Filter::new(1);
        {
            let _guard = filter.turn_off_scoped();
            assert!(!filter.is_on());
            {
                let _inner = filter.turn_off_scoped();
                assert!(!filter.is_on());
            }
            assert!(!filter.is_on());
        }
        assert!(filter.is_on());

        filter.set_on(false);
        drop(filter.turn_off_scoped());
        assert!(!filter.is_on());
    }

    #[test]
    fn guard_restores_on_panic() {
        let filter = Filter::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = filter.turn_off_scoped();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(filter.is_on());
    }

    #[test]
    fn resize_never_shrinks() {
        let mut filter = Filter::new(4);
        filter.resize_to(2);
        assert_eq!(filter.len(), 4);
        filter.resize_to(6);
        assert_eq!(filter.len(), 6);
        assert_eq!(filter.state(NodeId(5)).unwrap(), FilterState::NotFiltered);
    }

    #[test]
    fn load_checks_count_and_bytes() {
        let mut filter = Filter::new(3);
        filter.set(NodeId(2), FilterState::Filtered).unwrap();
        assert_eq!(filter.filtered_count(), 1);
        let mut w = BinaryWriter::new(Vec::new());
        filter.save(&mut w, 3).unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes, vec![3, 0, 0, 0, 1, 1, 0]);

        let mut other = Filter::new(3);
        other.load(&mut BinaryReader::new(&bytes[..]), 3).unwrap();
        assert_eq!(other.state(NodeId(2)).unwrap(), FilterState::Filtered);

        let err = other
            .load(&mut BinaryReader::new(&bytes[..]), 4)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Format(FormatError::CountMismatch { expected: 4, found: 3 })
        ));

        let bad = [1u8, 0, 0, 0, 7];
        other.initialize();
        assert!(other.load(&mut BinaryReader::new(&bad[..]), 1).is_err());
        assert_eq!(other.filtered_count(), 0);
    }
}
