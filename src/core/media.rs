//! Typed media/codec descriptors (C1).
//!
//! A [`Codec`] is an immutable record of one codec configuration; a [`Media`]
//! is a logical track offered or requested by a peer, carrying codecs in
//! preference order.

use serde::{Deserialize, Serialize};

/// The set of codec names the matcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecName {
    H264,
    H265,
    Opus,
    Pcma,
    Pcmu,
    Aac,
}

impl CodecName {
    pub fn as_str(&self) -> &str {
        match self {
            CodecName::H264 => "H264",
            CodecName::H265 => "H265",
            CodecName::Opus => "opus",
            CodecName::Pcma => "PCMA",
            CodecName::Pcmu => "PCMU",
            CodecName::Aac => "mpeg4-generic",
        }
    }
}

/// One codec configuration. Immutable once attached to a live [`Track`](super::track::Track).
#[derive(Debug, Clone, PartialEq)]
pub struct Codec {
    pub name: CodecName,
    pub clock_rate: u32,
    pub channels: Option<u16>,
    pub payload_type: u8,
    /// Opaque codec-specific parameters, e.g. `packetization-mode=1;profile-level-id=...`.
    pub fmtp_line: String,
}

impl Codec {
    pub fn new(name: CodecName, clock_rate: u32, payload_type: u8) -> Self {
        Self {
            name,
            clock_rate,
            channels: None,
            payload_type,
            fmtp_line: String::new(),
        }
    }

    pub fn with_fmtp(mut self, fmtp: impl Into<String>) -> Self {
        self.fmtp_line = fmtp.into();
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Extract a `key=value` field from the fmtp line, tolerant of `;` and `,`
    /// separated parameters and surrounding whitespace.
    pub fn fmtp_field(&self, key: &str) -> Option<&str> {
        self.fmtp_line.split([';', ' ']).find_map(|part| {
            let part = part.trim();
            part.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// Direction of a [`Media`], stated from the peer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Recvonly,
    Sendonly,
    Sendrecv,
}

impl Direction {
    /// The direction seen by the other side of the link.
    pub fn inverted(self) -> Self {
        match self {
            Direction::Recvonly => Direction::Sendonly,
            Direction::Sendonly => Direction::Recvonly,
            Direction::Sendrecv => Direction::Sendrecv,
        }
    }
}

/// Coarse media kind, used when an SDP `m=` line names a codec the matcher
/// doesn't recognize (the media is still kept, with an empty codec list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Video,
    Audio,
    Application,
}

/// One logical track offered or requested by a peer.
#[derive(Debug, Clone)]
pub struct Media {
    pub kind: Kind,
    pub direction: Direction,
    /// Acceptable codecs, in preference order.
    pub codecs: Vec<Codec>,
    /// Adapter-assigned identifier, e.g. RTSP's `trackID=3`.
    pub id: String,
}

impl Media {
    pub fn new(kind: Kind, direction: Direction) -> Self {
        Self {
            kind,
            direction,
            codecs: Vec::new(),
            id: String::new(),
        }
    }
}
