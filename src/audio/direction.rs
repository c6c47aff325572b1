use std::fmt;

use serde::Deserialize;

use super::server::{DeviceKind, StreamKind};

/// Which way call audio flows through a loopback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Modem capture played on the default sink.
    FromNetwork,
    /// Default source played into the modem.
    ToNetwork,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::FromNetwork, Direction::ToNetwork];

    /// Kind of the modem device the loopback is anchored on.
    pub fn master_kind(self) -> DeviceKind {
        match self {
            Direction::FromNetwork => DeviceKind::Source,
            Direction::ToNetwork => DeviceKind::Sink,
        }
    }

    /// Kind of the loopback stream that attaches to the modem device.
    pub fn stream_kind(self) -> StreamKind {
        match self {
            Direction::FromNetwork => StreamKind::SourceOutput,
            Direction::ToNetwork => StreamKind::SinkInput,
        }
    }

    pub fn media_label(self) -> &'static str {
        match self {
            Direction::FromNetwork => "Voice call audio (to speaker)",
            Direction::ToNetwork => "Voice call audio (from mic)",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::FromNetwork => "from network",
            Direction::ToNetwork => "to network",
        })
    }
}
