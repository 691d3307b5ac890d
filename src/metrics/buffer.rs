use std::collections::HashMap;

use super::{Category, Payload, Sample};

/// A sample plus its position in the global capture order.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    sample: Sample,
    /// Part of a batch that has been handed out and not yet resolved.
    in_flight: bool,
}

/// Snapshot of one category, taken when a flush starts.
///
/// Taking a batch reserves its samples: later snapshots skip them until the
/// batch is acknowledged or released.
#[derive(Debug, Clone)]
pub struct Batch {
    pub payload: Payload,
    /// Sequence numbers of the samples in `payload`, ascending.
    seqs: Vec<u64>,
}

impl Batch {
    pub fn category(&self) -> &Category {
        &self.payload.category
    }

    pub(crate) fn len(&self) -> usize {
        self.seqs.len()
    }
}

/// Per-category, append-only sample storage.
///
/// Samples are acknowledged by sequence number rather than by clearing the
/// whole bucket, so anything recorded while a batch is in flight survives the
/// batch's acknowledgement. A sample belongs to at most one unresolved batch
/// at a time.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    categories: HashMap<Category, Vec<Entry>>,
    next_seq: u64,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and return the category's new length.
    pub fn push(&mut self, category: &Category, sample: Sample) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;

        let entries = self.categories.entry(category.clone()).or_default();
        entries.push(Entry {
            seq,
            sample,
            in_flight: false,
        });
        entries.len()
    }

    /// Every buffered sample of the category, in flight or not.
    pub fn len(&self, category: &Category) -> usize {
        self.categories.get(category).map_or(0, Vec::len)
    }

    /// Samples not yet part of any unresolved batch.
    pub fn pending(&self, category: &Category) -> usize {
        self.categories
            .get(category)
            .map_or(0, |entries| entries.iter().filter(|e| !e.in_flight).count())
    }

    /// Reserve every pending sample of the category as a batch, or `None`
    /// when there is nothing pending.
    pub fn snapshot(&mut self, category: &Category) -> Option<Batch> {
        let entries = self.categories.get_mut(category)?;

        let mut seqs = Vec::new();
        let mut metrics = Vec::new();
        for entry in entries.iter_mut().filter(|e| !e.in_flight) {
            entry.in_flight = true;
            seqs.push(entry.seq);
            metrics.push(entry.sample.clone());
        }
        if seqs.is_empty() {
            return None;
        }

        Some(Batch {
            payload: Payload {
                category: category.clone(),
                metrics,
            },
            seqs,
        })
    }

    /// The batch was delivered: drop its samples. Returns how many were
    /// removed.
    pub fn acknowledge(&mut self, batch: &Batch) -> usize {
        let Some(entries) = self.categories.get_mut(batch.category()) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|e| batch.seqs.binary_search(&e.seq).is_err());
        before - entries.len()
    }

    /// The batch failed: its samples become pending again, in place.
    pub fn release(&mut self, batch: &Batch) {
        let Some(entries) = self.categories.get_mut(batch.category()) else {
            return;
        };
        for entry in entries.iter_mut() {
            if batch.seqs.binary_search(&entry.seq).is_ok() {
                entry.in_flight = false;
            }
        }
    }

    pub fn samples(&self, category: &Category) -> Vec<Sample> {
        self.categories
            .get(category)
            .map(|entries| entries.iter().map(|e| e.sample.clone()).collect())
            .unwrap_or_default()
    }

    /// Categories that currently hold at least one sample.
    pub fn non_empty(&self) -> Vec<Category> {
        let mut cats: Vec<_> = self
            .categories
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(cat, _)| cat.clone())
            .collect();
        cats.sort();
        cats
    }

    /// Every category that has ever been recorded into, empty or not.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.keys()
    }
}
