//! Codec-specific bitstream helpers (C7): NALU parsing for H.264/H.265 and
//! the AVCC/Annex-B conversions used at the RTSP/adapter boundary.

pub mod h264;
pub mod h265;
