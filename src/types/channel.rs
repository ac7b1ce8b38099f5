//! Channel identifiers and the renderer's enabled-channel set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One value column of a telemetry record (the timestamp is not a channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Pressure1,
    Pressure2,
    Pressure3,
    Pressure4,
    Pressure5,
    Pressure6,
    Pressure7,
    Pressure8,
    FsrLeft,
    FsrRight,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; 10] = [
        Channel::Pressure1,
        Channel::Pressure2,
        Channel::Pressure3,
        Channel::Pressure4,
        Channel::Pressure5,
        Channel::Pressure6,
        Channel::Pressure7,
        Channel::Pressure8,
        Channel::FsrLeft,
        Channel::FsrRight,
    ];

    /// Zero-based column index (0-7 pressure, 8 FSR left, 9 FSR right).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Canonical lowercase name used in config files and JSON output.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Pressure1 => "pressure1",
            Channel::Pressure2 => "pressure2",
            Channel::Pressure3 => "pressure3",
            Channel::Pressure4 => "pressure4",
            Channel::Pressure5 => "pressure5",
            Channel::Pressure6 => "pressure6",
            Channel::Pressure7 => "pressure7",
            Channel::Pressure8 => "pressure8",
            Channel::FsrLeft => "fsr_left",
            Channel::FsrRight => "fsr_right",
        }
    }

    /// Column label written to the persisted file header.
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Pressure1 => "Pressure1[kPa]",
            Channel::Pressure2 => "Pressure2[kPa]",
            Channel::Pressure3 => "Pressure3[kPa]",
            Channel::Pressure4 => "Pressure4[kPa]",
            Channel::Pressure5 => "Pressure5[kPa]",
            Channel::Pressure6 => "Pressure6[kPa]",
            Channel::Pressure7 => "Pressure7[kPa]",
            Channel::Pressure8 => "Pressure8[kPa]",
            Channel::FsrLeft => "FSR_L",
            Channel::FsrRight => "FSR_R",
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::ALL.len() {
            Some(Self::ALL[index])
        } else {
            None
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown channel '{0}'")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let channel = match lower.as_str() {
            "pressure1" | "p1" => Channel::Pressure1,
            "pressure2" | "p2" => Channel::Pressure2,
            "pressure3" | "p3" => Channel::Pressure3,
            "pressure4" | "p4" => Channel::Pressure4,
            "pressure5" | "p5" => Channel::Pressure5,
            "pressure6" | "p6" => Channel::Pressure6,
            "pressure7" | "p7" => Channel::Pressure7,
            "pressure8" | "p8" => Channel::Pressure8,
            "fsr_left" | "fsr_l" => Channel::FsrLeft,
            "fsr_right" | "fsr_r" => Channel::FsrRight,
            _ => return Err(UnknownChannel(s.trim().to_string())),
        };
        Ok(channel)
    }
}

// ============================================================================
// ChannelSet
// ============================================================================

/// Set of channels a renderer currently wants to see.
///
/// Iteration is always in wire order regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Channel>", into = "Vec<Channel>")]
pub struct ChannelSet(u16);

impl ChannelSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self((1 << Channel::ALL.len()) - 1)
    }

    /// The eight pressure channels only.
    pub const fn pressure() -> Self {
        Self(0xFF)
    }

    pub fn insert(&mut self, channel: Channel) {
        self.0 |= 1 << channel.index();
    }

    pub fn remove(&mut self, channel: Channel) {
        self.0 &= !(1 << channel.index());
    }

    /// Flip a channel on or off, mirroring a visibility checkbox.
    pub fn set(&mut self, channel: Channel, enabled: bool) {
        if enabled {
            self.insert(channel);
        } else {
            self.remove(channel);
        }
    }

    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel.index()) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Parse a comma-separated channel list such as `"p1,p2,fsr_l"`.
    ///
    /// `"all"` selects every channel; `"pressure"` selects channels 1-8.
    pub fn parse_list(list: &str) -> Result<Self, UnknownChannel> {
        let mut set = Self::empty();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.to_ascii_lowercase().as_str() {
                "all" => set = Self::all(),
                "pressure" => set.0 |= Self::pressure().0,
                _ => set.insert(item.parse()?),
            }
        }
        Ok(set)
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        let mut set = Self::empty();
        for channel in iter {
            set.insert(channel);
        }
        set
    }
}

impl From<Vec<Channel>> for ChannelSet {
    fn from(channels: Vec<Channel>) -> Self {
        channels.into_iter().collect()
    }
}

impl From<ChannelSet> for Vec<Channel> {
    fn from(set: ChannelSet) -> Self {
        set.iter().collect()
    }
}
