//! Read-only copies of the live window handed to renderers

use serde::{Deserialize, Serialize};

use crate::types::Channel;

/// Values of one channel, index-aligned with [`Snapshot::timestamps`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSeries {
    pub channel: Channel,
    pub values: Vec<f64>,
}

/// Point-in-time copy of the live window.
///
/// Every series has exactly `timestamps.len()` values and series appear in
/// wire order. Disabled channels are absent rather than empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamps: Vec<f64>,
    pub series: Vec<ChannelSeries>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn series(&self, channel: Channel) -> Option<&ChannelSeries> {
        self.series.iter().find(|s| s.channel == channel)
    }

    /// Time covered by the snapshot, first to last sample (ms).
    pub fn span_ms(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Most recent value of a channel, if it is present.
    pub fn latest(&self, channel: Channel) -> Option<f64> {
        self.series(channel).and_then(|s| s.values.last().copied())
    }
}
