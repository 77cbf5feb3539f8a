//! Facility time slots.
//!
//! A slot is a half-open `[start, end)` range aligned to whole minutes. The
//! lock keyspace uses Unix seconds, so alignment is checked here before any
//! key is derived.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("end must be after start")]
    EmptyRange,

    #[error("{0} is not aligned to a whole minute")]
    Unaligned(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl SlotRange {
    /// Build a validated range.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, SlotError> {
        if end <= start {
            return Err(SlotError::EmptyRange);
        }
        if !is_minute_aligned(start) {
            return Err(SlotError::Unaligned("start"));
        }
        if !is_minute_aligned(end) {
            return Err(SlotError::Unaligned("end"));
        }
        Ok(Self { start, end })
    }

    /// Half-open overlap: touching ranges (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &SlotRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn overlaps_raw(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start < end && self.end > start
    }

    pub fn start_unix(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_unix(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

fn is_minute_aligned(ts: Timestamp) -> bool {
    ts.second() == 0 && ts.nanosecond() == 0
}
