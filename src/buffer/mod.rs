//! Live Window Buffer
//!
//! Holds the most recent `horizon_ms` of records for live display. Storage is
//! column-wise: one timestamp column plus one column per channel, always
//! trimmed together so index `i` is the same sample everywhere.
//!
//! Records are kept in arrival order. Eviction assumes timestamps are
//! non-decreasing; an out-of-order record is stored where it arrived and the
//! front scan stops at the first sample inside the window.

mod snapshot;

pub use snapshot::{ChannelSeries, Snapshot};

use std::collections::VecDeque;

use crate::config::defaults::HORIZON_MS;
use crate::types::{Channel, ChannelSet, Record};

const CHANNEL_COUNT: usize = Channel::ALL.len();

/// Sliding time window of records, owned by the pipeline driver.
#[derive(Debug, Clone)]
pub struct WindowedBuffer {
    horizon_ms: f64,
    timestamps: VecDeque<f64>,
    columns: [VecDeque<f64>; CHANNEL_COUNT],
    evicted_total: u64,
}

impl WindowedBuffer {
    /// Create an empty buffer. `horizon_ms` is expected to be positive and
    /// finite (see `StreamConfig::validate`).
    pub fn new(horizon_ms: f64) -> Self {
        Self {
            horizon_ms,
            timestamps: VecDeque::new(),
            columns: std::array::from_fn(|_| VecDeque::new()),
            evicted_total: 0,
        }
    }

    /// Append a record, then drop everything older than
    /// `record.timestamp_ms - horizon_ms`.
    pub fn append(&mut self, record: &Record) {
        self.timestamps.push_back(record.timestamp_ms);
        for channel in Channel::ALL {
            self.columns[channel.index()].push_back(record.channel(channel));
        }

        let threshold = record.timestamp_ms - self.horizon_ms;
        if threshold <= 0.0 {
            return;
        }

        let keep_from = self
            .timestamps
            .iter()
            .position(|&t| t >= threshold)
            .unwrap_or(self.timestamps.len());
        if keep_from == 0 {
            return;
        }

        self.timestamps.drain(..keep_from);
        for column in &mut self.columns {
            column.drain(..keep_from);
        }
        self.evicted_total += keep_from as u64;
    }

    /// Copy the window, restricted to `channels`.
    pub fn snapshot(&self, channels: &ChannelSet) -> Snapshot {
        Snapshot {
            timestamps: self.timestamps.iter().copied().collect(),
            series: channels
                .iter()
                .map(|channel| ChannelSeries {
                    channel,
                    values: self.columns[channel.index()].iter().copied().collect(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Drop every record. Eviction totals are kept.
    pub fn clear(&mut self) {
        self.timestamps.clear();
        for column in &mut self.columns {
            column.clear();
        }
    }

    /// The most recently appended record.
    pub fn latest(&self) -> Option<Record> {
        let last = self.timestamps.len().checked_sub(1)?;
        let mut fields = [0.0; crate::types::RECORD_FIELD_COUNT];
        fields[0] = self.timestamps[last];
        for (slot, column) in fields[1..].iter_mut().zip(&self.columns) {
            *slot = column[last];
        }
        Some(Record::from_fields(fields))
    }

    pub fn horizon_ms(&self) -> f64 {
        self.horizon_ms
    }

    /// Records evicted since construction.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }
}

impl Default for WindowedBuffer {
    fn default() -> Self {
        Self::new(HORIZON_MS)
    }
}
