//! Telemetry record type

use serde::{Deserialize, Serialize};

use super::Channel;

/// Number of leading numeric fields every telemetry line must carry.
pub const RECORD_FIELD_COUNT: usize = 11;

/// Number of pMMG pressure channels per record.
pub const PRESSURE_CHANNELS: usize = 8;

/// One fully parsed telemetry sample.
///
/// Wire order: `timestamp_ms, pressure1..pressure8, fsr_left, fsr_right`.
/// Only [`parse_line`](crate::acquisition::parse_line) builds these from
/// device input, so every `Record` in the pipeline came from a line with at
/// least eleven numeric leading fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Device timestamp (ms)
    pub timestamp_ms: f64,
    /// pMMG pressure channels 1-8 (kPa)
    pub pressure: [f64; PRESSURE_CHANNELS],
    /// Left force-sensing resistor (raw)
    pub fsr_left: f64,
    /// Right force-sensing resistor (raw)
    pub fsr_right: f64,
}

impl Record {
    /// Build a record from the eleven wire fields in order.
    pub fn from_fields(fields: [f64; RECORD_FIELD_COUNT]) -> Self {
        let mut pressure = [0.0; PRESSURE_CHANNELS];
        pressure.copy_from_slice(&fields[1..=PRESSURE_CHANNELS]);
        Self {
            timestamp_ms: fields[0],
            pressure,
            fsr_left: fields[9],
            fsr_right: fields[10],
        }
    }

    /// The eleven values in wire order.
    pub fn fields(&self) -> [f64; RECORD_FIELD_COUNT] {
        let mut out = [0.0; RECORD_FIELD_COUNT];
        out[0] = self.timestamp_ms;
        out[1..=PRESSURE_CHANNELS].copy_from_slice(&self.pressure);
        out[9] = self.fsr_left;
        out[10] = self.fsr_right;
        out
    }

    /// Value of a single channel.
    pub fn channel(&self, channel: Channel) -> f64 {
        match channel {
            Channel::FsrLeft => self.fsr_left,
            Channel::FsrRight => self.fsr_right,
            pressure => self.pressure[pressure.index()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_positional_mapping() {
        let fields = [12.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let record = Record::from_fields(fields);

        assert_eq!(record.timestamp_ms, 12.0);
        assert_eq!(record.pressure, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(record.fsr_left, 9.0);
        assert_eq!(record.fsr_right, 10.0);
        assert_eq!(record.fields(), fields);
    }

    #[test]
    fn test_channel_lookup() {
        let record = Record::from_fields([0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);

        assert_eq!(record.channel(Channel::Pressure1), 1.0);
        assert_eq!(record.channel(Channel::Pressure8), 8.0);
        assert_eq!(record.channel(Channel::FsrLeft), 9.0);
        assert_eq!(record.channel(Channel::FsrRight), 10.0);
    }
}
