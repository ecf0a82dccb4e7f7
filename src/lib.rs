//! mediahub - a small camera/audio streaming hub
//!
//! Pulls media in from cameras and other sources over a handful of
//! protocols, matches codecs between producers and consumers, and fans RTP
//! packets out to however many viewers are attached, all without
//! transcoding.

pub mod adapters;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod rtsp;
pub mod state;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};
