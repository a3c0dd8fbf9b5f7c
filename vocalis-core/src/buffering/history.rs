//! Bounded pitch history used for display and range learning.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pitch::note::{NoteLabel, PitchClass};

/// One accepted, display-worthy reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchHistoryEntry {
    pub frequency: f32,
    pub note: PitchClass,
    pub octave: i32,
    pub cents: f32,
    pub timestamp: DateTime<Utc>,
}

impl PitchHistoryEntry {
    pub fn new(frequency: f32, label: NoteLabel, timestamp: DateTime<Utc>) -> Self {
        Self {
            frequency,
            note: label.note,
            octave: label.octave,
            cents: label.cents,
            timestamp,
        }
    }
}

/// Ring buffer of the most recent entries; the oldest is evicted when full.
#[derive(Debug, Clone)]
pub struct PitchHistory {
    entries: VecDeque<PitchHistoryEntry>,
    capacity: usize,
}

impl PitchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: PitchHistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &PitchHistoryEntry> {
        self.entries.iter()
    }

    /// Frequencies of the newest `n` entries, oldest first.
    pub fn recent_frequencies(&self, n: usize) -> Vec<f32> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(|e| e.frequency).collect()
    }

    pub fn latest(&self) -> Option<&PitchHistoryEntry> {
        self.entries.back()
    }
}
