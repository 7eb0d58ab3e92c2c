use std::collections::HashSet;
use tracing::debug;

use crate::parser::Record;

/// Outcome of offering a record to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate,
    LimitReached,
}

/// Run-wide gate deciding which records reach the output
pub struct Scheduler {
    /// Ids of every record accepted so far, whatever their kind
    seen: HashSet<u64>,

    /// Global cap on emitted records
    max_items: Option<usize>,

    /// Accepted records, one slot per input so output follows input order
    slots: Vec<Vec<Record>>,

    emitted: usize,
}

impl Scheduler {
    /// Create a scheduler for `inputs` input URLs
    pub fn new(inputs: usize, max_items: Option<usize>) -> Self {
        Self {
            seen: HashSet::new(),
            max_items,
            slots: vec![Vec::new(); inputs],
            emitted: 0,
        }
    }

    /// Offer a record produced for input `slot`
    pub fn admit(&mut self, slot: usize, record: Record) -> Admission {
        let id = record.id();

        if self.seen.contains(&id) {
            debug!("Skipping duplicate {:?} {}", record.kind(), id);
            return Admission::Duplicate;
        }

        if self.is_full() {
            return Admission::LimitReached;
        }

        let Some(bucket) = self.slots.get_mut(slot) else {
            debug!("No slot {} for {:?} {}", slot, record.kind(), id);
            return Admission::LimitReached;
        };

        self.seen.insert(id);
        bucket.push(record);
        self.emitted += 1;
        Admission::Accepted
    }

    /// Whether a record with this id was already accepted
    pub fn has_seen(&self, id: u64) -> bool {
        self.seen.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.max_items.map_or(false, |max| self.emitted >= max)
    }

    /// How many more records may be accepted
    pub fn remaining(&self) -> Option<usize> {
        self.max_items.map(|max| max.saturating_sub(self.emitted))
    }

    /// Accepted records in input order
    pub fn into_records(self) -> Vec<Record> {
        self.slots.into_iter().flatten().collect()
    }
}
