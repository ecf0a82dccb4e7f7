//! `exec:` adapter (§4.7 worked example): spawns a subprocess whose stdout is
//! a raw Annex-B H.264 elementary stream (e.g. `ffmpeg ... -f h264 -`), and
//! republishes it as a single-media [`Producer`].

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use rtp::packet::{Header, Packet};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::codec::h264;
use crate::core::media::{Codec, CodecName, Direction, Kind, Media};
use crate::core::producer::Producer;
use crate::core::track::Track;
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::warn_throttled;

const MAX_FRAME_BUFFER: usize = 4 * 1024 * 1024;
const RTP_MTU: usize = 1200;

pub struct ExecProducer {
    command_line: String,
    track: Track,
    media: Media,
    stopped: Arc<Notify>,
    overflow_warnings: LogThrottler,
}

impl ExecProducer {
    /// `url` is `exec:<shell command>`; the command is run through `/bin/sh -c`.
    pub fn new(url: &str) -> Result<Self> {
        let command_line = url
            .strip_prefix("exec:")
            .ok_or_else(|| AppError::Unresolved(format!("not an exec: url: {url}")))?
            .to_string();

        let mut media = Media::new(Kind::Video, Direction::Recvonly);
        media.id = "trackID=0".to_string();
        let codec = Codec::new(CodecName::H264, 90_000, 96).with_fmtp("packetization-mode=1");
        media.codecs.push(codec.clone());

        Ok(Self {
            command_line,
            track: Track::new(codec),
            media,
            stopped: Arc::new(Notify::new()),
            overflow_warnings: LogThrottler::with_secs(10),
        })
    }
}

#[async_trait]
impl Producer for ExecProducer {
    fn medias(&self) -> Vec<Media> {
        vec![self.media.clone()]
    }

    async fn get_track(&self, _media: &Media, _codec: &Codec) -> Result<Track> {
        Ok(self.track.clone())
    }

    async fn start(&self) -> Result<()> {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command_line)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(AppError::Io)?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Internal("exec: child has no stdout".to_string()))?;

        let track = self.track.clone();
        let stopped = self.stopped.clone();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 65536];
        let mut seq = 0u16;

        loop {
            tokio::select! {
                _ = stopped.notified() => {
                    let _ = child.kill().await;
                    return Ok(());
                }
                n = stdout.read(&mut chunk) => {
                    let n = n.map_err(AppError::Io)?;
                    if n == 0 {
                        return Ok(());
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > MAX_FRAME_BUFFER {
                        warn_throttled!(
                            self.overflow_warnings,
                            "oversized_buffer",
                            command = %self.command_line,
                            "exec producer dropped oversized buffer without a start code"
                        );
                        buf.clear();
                    }
                    drain_access_units(&mut buf, &track, &mut seq);
                }
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.notify_waiters();
        Ok(())
    }

    fn addr(&self) -> String {
        format!("exec:{}", self.command_line)
    }
}

/// Pull complete Annex-B access units (bounded by the next start code) out of
/// `buf`, convert to AVCC, and fan them out as RTP packets.
fn drain_access_units(buf: &mut Vec<u8>, track: &Track, seq: &mut u16) {
    loop {
        let Some(first) = find_start_code(buf, 0) else { return };
        let Some(second) = find_start_code(buf, first + 3) else { return };

        let annexb_unit = buf[first..second].to_vec();
        let avcc = h264::annexb_to_avcc(&annexb_unit);
        let keyframe = h264::is_keyframe(&avcc);

        for payload in chunk_payload(&avcc) {
            *seq = seq.wrapping_add(1);
            let packet = Packet {
                header: Header {
                    version: 2,
                    marker: keyframe,
                    payload_type: 96,
                    sequence_number: *seq,
                    ..Default::default()
                },
                payload,
            };
            track.write_rtp(&packet);
        }

        buf.drain(..second);
    }
}

fn chunk_payload(avcc: &[u8]) -> Vec<bytes::Bytes> {
    avcc.chunks(RTP_MTU)
        .map(|c| bytes::Bytes::copy_from_slice(c))
        .collect()
}

fn find_start_code(b: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 <= b.len() {
        if b[i] == 0 && b[i + 1] == 0 && b[i + 2] == 1 {
            return Some(i);
        }
        if i + 4 <= b.len() && b[i] == 0 && b[i + 1] == 0 && b[i + 2] == 0 && b[i + 3] == 1 {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_urls_without_the_exec_scheme() {
        assert!(ExecProducer::new("rtsp://host/stream").is_err());
    }

    #[test]
    fn find_start_code_locates_four_byte_prefix() {
        let data = [0xAA, 0, 0, 0, 1, 0x67];
        assert_eq!(find_start_code(&data, 0), Some(1));
    }
}
