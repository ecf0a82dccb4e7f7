//! RTSP client dial (§4.7 adapter shell, `rtsp:`/`rtsps:` scheme): connects
//! out to a camera, forces TCP interleaved transport, and exposes the
//! resulting medias as a [`Producer`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rtp::packet::Packet;
use rtsp_types::headers::{self};
use rtsp_types::{Method, Request, StatusCode, Version};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use url::Url;
use webrtc_util::marshal::Unmarshal;

use crate::core::media::{Codec, Direction, Media};
use crate::core::producer::Producer;
use crate::core::track::Track;
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::warn_throttled;

use super::sdp;
use super::wire::{RtspConn, WireEvent};

pub struct RtspClientProducer {
    url: String,
    medias: Mutex<Vec<Media>>,
    tracks: Arc<Mutex<HashMap<String, Track>>>,
    channel_media: Mutex<HashMap<u8, String>>,
    stopped: Arc<Notify>,
}

impl RtspClientProducer {
    /// Dial `url`, run DESCRIBE + SETUP for every media, but don't start
    /// streaming yet; `start()` issues PLAY and pumps interleaved frames.
    pub async fn connect(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| AppError::Unresolved(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::Unresolved("missing host in rtsp URL".to_string()))?;
        let port = parsed.port().unwrap_or(554);

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(AppError::Io)?;
        let mut conn = RtspConn::new(stream);

        let mut cseq = 1u32;
        let describe = Request::builder(Method::Describe, Version::V1_0)
            .request_uri(parsed.clone())
            .header(headers::CSEQ, cseq.to_string())
            .header(headers::ACCEPT, "application/sdp")
            .build(Vec::new());
        conn.write_request(&describe).await?;
        cseq += 1;

        let medias = match conn.read_event().await? {
            WireEvent::Response(res) if res.status() == StatusCode::Ok => {
                sdp::unmarshal_sdp(res.body())?
            }
            _ => return Err(AppError::Upstream(format!("DESCRIBE failed for {url}"))),
        };

        let mut channel_media = HashMap::new();
        for (index, media) in medias.iter().enumerate() {
            let setup_uri = format!("{url}/trackID={index}");
            let setup = Request::builder(Method::Setup, Version::V1_0)
                .request_uri(Url::parse(&setup_uri).map_err(|e| AppError::Unresolved(e.to_string()))?)
                .header(headers::CSEQ, cseq.to_string())
                .header(headers::TRANSPORT, "RTP/AVP/TCP;unicast;interleaved=0-1")
                .build(Vec::new());
            conn.write_request(&setup).await?;
            cseq += 1;

            match conn.read_event().await? {
                WireEvent::Response(res) if res.status() == StatusCode::Ok => {
                    let channel = res
                        .header(&headers::TRANSPORT)
                        .and_then(|t| parse_interleaved_channel(t.as_str()))
                        .unwrap_or((index as u8) * 2);
                    channel_media.insert(channel, media.id.clone());
                }
                _ => return Err(AppError::Upstream(format!("SETUP failed for {setup_uri}"))),
            }
        }

        let play = Request::builder(Method::Play, Version::V1_0)
            .request_uri(parsed)
            .header(headers::CSEQ, cseq.to_string())
            .build(Vec::new());
        conn.write_request(&play).await?;
        match conn.read_event().await? {
            WireEvent::Response(res) if res.status() == StatusCode::Ok => {}
            _ => return Err(AppError::Upstream(format!("PLAY failed for {url}"))),
        }

        let producer = RtspClientProducer {
            url: url.to_string(),
            medias: Mutex::new(medias.iter().cloned().map(|mut m| { m.direction = Direction::Recvonly; m }).collect()),
            tracks: Arc::new(Mutex::new(HashMap::new())),
            channel_media: Mutex::new(channel_media),
            stopped: Arc::new(Notify::new()),
        };

        // Own the connection on a dedicated task; it feeds tracks via `write_rtp`
        // and is the only writer/reader for the socket from here on.
        let channel_media_map = producer.channel_media.lock().clone();
        let tracks = producer.tracks.clone();
        let stopped = producer.stopped.clone();
        tokio::spawn(pump(conn, channel_media_map, tracks, stopped));

        Ok(producer)
    }
}

fn parse_interleaved_channel(transport: &str) -> Option<u8> {
    transport
        .split(';')
        .find_map(|part| part.trim().strip_prefix("interleaved="))
        .and_then(|range| range.split_once('-').map(|(a, _)| a))
        .and_then(|a| a.parse().ok())
}

async fn pump(
    mut conn: RtspConn,
    channel_media: HashMap<u8, String>,
    tracks: Arc<Mutex<HashMap<String, Track>>>,
    stopped: Arc<Notify>,
) {
    let malformed_packet_warnings = LogThrottler::with_secs(10);

    loop {
        tokio::select! {
            _ = stopped.notified() => return,
            event = conn.read_event() => {
                let Ok(WireEvent::Frame(frame)) = event else { return };
                let Some(media_id) = channel_media.get(&frame.channel) else { continue };
                let track = tracks.lock().get(media_id).cloned();
                let Some(track) = track else { continue };
                let mut payload = frame.payload.as_slice();
                match Packet::unmarshal(&mut payload) {
                    Ok(packet) => track.write_rtp(&packet),
                    Err(err) => {
                        warn_throttled!(
                            malformed_packet_warnings,
                            media_id,
                            media = %media_id, error = %err, "dropped malformed RTP packet"
                        );
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Producer for RtspClientProducer {
    fn medias(&self) -> Vec<Media> {
        self.medias.lock().clone()
    }

    async fn get_track(&self, media: &Media, codec: &Codec) -> Result<Track> {
        let mut tracks = self.tracks.lock();
        Ok(tracks
            .entry(media.id.clone())
            .or_insert_with(|| Track::new(codec.clone()))
            .clone())
    }

    async fn start(&self) -> Result<()> {
        self.stopped.notified().await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.notify_waiters();
        Ok(())
    }

    fn addr(&self) -> String {
        self.url.clone()
    }
}
