//! In-memory aggregation of landing page events
//!
//! Events are summed per [`BucketKey`] and handed out in batches. A batch is
//! forced once `max_batch` events have been buffered, which also caps the
//! number of distinct keys held. Storage adds each batch onto whatever the
//! bucket already holds, so the final counts do not depend on where batch
//! boundaries fall.

use crate::validate::landingpage::LandingPageEvent;
use chrono::{NaiveDateTime, Timelike};
use std::collections::{BTreeSet, HashMap};

/// Dimensions of one landing page bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    /// Event time truncated to the minute
    pub bucket_time: NaiveDateTime,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_medium: String,
    pub utm_key: String,
    pub landingpage: String,
    pub project: String,
    pub language: String,
    pub country: String,
}

impl BucketKey {
    pub fn from_event(event: &LandingPageEvent) -> Self {
        Self {
            bucket_time: truncate_to_minute(event.time),
            utm_source: event.utm_source.clone(),
            utm_campaign: event.utm_campaign.clone(),
            utm_medium: event.utm_medium.clone(),
            utm_key: event.utm_key.clone(),
            landingpage: event.landingpage.clone(),
            project: event.project.clone(),
            language: event.language.clone(),
            country: event.country.clone(),
        }
    }
}

fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// A donor contact seen on a landing page, first sighting wins in storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueContact {
    pub utm_source: String,
    pub contact_id: String,
}

/// Everything buffered since the last flush
#[derive(Debug, Default)]
pub struct Batch {
    /// Sorted by key so upserts lock rows in a stable order
    pub buckets: Vec<(BucketKey, i64)>,
    pub contacts: Vec<UniqueContact>,
    pub events: u64,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

#[derive(Debug)]
pub struct Aggregator {
    max_batch: usize,
    buckets: HashMap<BucketKey, i64>,
    contacts: BTreeSet<UniqueContact>,
    pending: usize,
}

impl Aggregator {
    pub fn new(max_batch: usize) -> Self {
        Self {
            max_batch: max_batch.max(1),
            buckets: HashMap::new(),
            contacts: BTreeSet::new(),
            pending: 0,
        }
    }

    /// Buffer one event; returns true once the batch must be flushed
    pub fn add(&mut self, event: &LandingPageEvent) -> bool {
        *self.buckets.entry(BucketKey::from_event(event)).or_insert(0) += 1;

        if !event.contact_id.is_empty() {
            self.contacts.insert(UniqueContact {
                utm_source: event.utm_source.clone(),
                contact_id: event.contact_id.clone(),
            });
        }

        self.pending += 1;
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.pending >= self.max_batch
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Distinct keys currently buffered
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Take the buffered batch, leaving the aggregator empty
    pub fn drain(&mut self) -> Batch {
        let mut buckets: Vec<_> = self.buckets.drain().collect();
        buckets.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let batch = Batch {
            buckets,
            contacts: std::mem::take(&mut self.contacts).into_iter().collect(),
            events: self.pending as u64,
        };
        self.pending = 0;
        batch
    }
}
