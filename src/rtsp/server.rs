//! RTSP server connection state machine (§4.5): one TCP client, walking
//! OPTIONS → {DESCRIBE, ANNOUNCE} → SETUP... → {PLAY, RECORD} → TEARDOWN.
//!
//! A connection can act as the hub's [`Consumer`] (client `PLAY`s a stream
//! out) or its [`Producer`] (client `RECORD`s a stream in) depending on
//! which request started the session, mirroring the upstream RTSP source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rtp::packet::Packet;
use rtsp_types::headers::{self, transport::Transport};
use rtsp_types::{Method, Request, Response, StatusCode, Version};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use webrtc_util::marshal::Marshal;

use crate::core::consumer::Consumer;
use crate::core::media::{Codec, Direction, Media};
use crate::core::producer::Producer;
use crate::core::registry::StreamRegistry;
use crate::core::stream::Stream;
use crate::core::track::{Subscriber, SubscriptionHandle, Track};
use crate::error::{AppError, Result};

use super::auth::{self, Credentials};
use super::sdp;
use super::wire::{RtspConn, WireEvent};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unknown,
    PassiveProducer, // client RECORDs (we act as Producer)
    PassiveConsumer, // client PLAYs (we act as Consumer)
}

struct FrameForwarder {
    channel: u8,
    tx: mpsc::UnboundedSender<(u8, Bytes)>,
}

impl Subscriber for FrameForwarder {
    fn on_packet(&self, packet: &Packet) {
        if let Ok(bytes) = packet.marshal() {
            let _ = self.tx.send((self.channel, bytes));
        }
    }
}

/// The hub-facing `Consumer` side of a server connection with an active `PLAY`.
struct SessionConsumer {
    medias: Vec<Media>,
    channels: HashMap<String, u8>,
    tx: mpsc::UnboundedSender<(u8, Bytes)>,
    handles: Mutex<Vec<SubscriptionHandle>>,
    addr: String,
}

#[async_trait]
impl Consumer for SessionConsumer {
    fn medias(&self) -> Vec<Media> {
        self.medias.clone()
    }

    async fn add_track(&self, media: &Media, _codec: &Codec, track: Track) -> Result<()> {
        let channel = *self
            .channels
            .get(&media.id)
            .ok_or_else(|| AppError::Protocol(format!("media {} was never SETUP", media.id)))?;
        let handle = track.subscribe(Arc::new(FrameForwarder {
            channel,
            tx: self.tx.clone(),
        }));
        self.handles.lock().push(handle);
        Ok(())
    }

    fn addr(&self) -> String {
        self.addr.clone()
    }
}

/// The hub-facing `Producer` side of a server connection with an active `RECORD`.
struct SessionProducer {
    medias: Vec<Media>,
    tracks: Mutex<HashMap<String, Track>>,
    stopped: Arc<Notify>,
    addr: String,
}

#[async_trait]
impl Producer for SessionProducer {
    fn medias(&self) -> Vec<Media> {
        self.medias.clone()
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
        self.addr.clone()
    }
}

/// Serve one accepted RTSP client connection until `TEARDOWN` or disconnect.
pub async fn serve_connection(
    stream: TcpStream,
    registry: Arc<StreamRegistry>,
    credentials: Option<(String, String)>,
) -> Result<()> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    let mut conn = RtspConn::new(stream);

    let nonce = format!("{:x}", rand::random::<u64>());
    let mut mode = Mode::Unknown;
    let mut announced_medias: Vec<Media> = Vec::new();
    let mut setup_channels: HashMap<String, u8> = HashMap::new();
    let mut stream_name = String::new();
    let mut next_channel = 0u8;

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<(u8, Bytes)>();
    let producer: Arc<SessionProducer> = Arc::new(SessionProducer {
        medias: Vec::new(),
        tracks: Mutex::new(HashMap::new()),
        stopped: Arc::new(Notify::new()),
        addr: peer_addr.clone(),
    });
    let record_started = AtomicBool::new(false);
    let mut active_consumer: Option<(Arc<Stream>, Arc<dyn Consumer>)> = None;

    loop {
        tokio::select! {
            biased;

            Some((channel, bytes)) = frame_rx.recv() => {
                conn.write_frame(channel, &bytes).await?;
                continue;
            }

            event = conn.read_event() => {
                let Ok(WireEvent::Request(req)) = event else {
                    if let Some((target, consumer)) = active_consumer.take() {
                        target.remove_consumer(&consumer);
                    }
                    return Ok(());
                };

                if let Some((user, pass)) = &credentials {
                    let creds = Credentials { username: user, password: pass };
                    if !auth::validate(&req, &creds, &req.method().to_string(), &nonce) {
                        let res = unauthorized_response(&req, &nonce);
                        conn.write_response(&res).await?;
                        if req.header(&headers::AUTHORIZATION).is_some() {
                            // A credential was presented and rejected: this is a
                            // terminal failure, not a retry invitation.
                            if let Some((target, consumer)) = active_consumer.take() {
                                target.remove_consumer(&consumer);
                            }
                            return Err(AppError::FailedAuth(peer_addr));
                        }
                        continue;
                    }
                }

                if stream_name.is_empty() {
                    stream_name = extract_stream_name(req.request_uri().map(|u| u.as_str()).unwrap_or_default());
                }

                match req.method() {
                    Method::Options => {
                        let res = ok_response(&req)
                            .header(headers::PUBLIC, "OPTIONS, SETUP, TEARDOWN, DESCRIBE, PLAY, ANNOUNCE, RECORD")
                            .build(Vec::new());
                        conn.write_response(&res).await?;
                    }

                    Method::Announce => {
                        announced_medias = sdp::unmarshal_sdp(req.body())?;
                        mode = Mode::PassiveProducer;
                        let res = ok_response(&req).build(Vec::new());
                        conn.write_response(&res).await?;
                    }

                    Method::Describe => {
                        mode = Mode::PassiveConsumer;
                        let Some(target) = registry.get_stream(&stream_name) else {
                            let res = Response::builder(Version::V1_0, StatusCode::NotFound).build(Vec::new());
                            conn.write_response(&res).await?;
                            continue;
                        };
                        announced_medias = target
                            .producers_snapshot()
                            .into_iter()
                            .flat_map(|(p, _, _)| p.medias())
                            .map(|mut m| { m.direction = Direction::Sendonly; m })
                            .collect();
                        let body = sdp::marshal_sdp(&stream_name, &announced_medias);
                        let res = ok_response(&req)
                            .header(headers::CONTENT_TYPE, "application/sdp")
                            .build(body);
                        conn.write_response(&res).await?;
                    }

                    Method::Setup => {
                        let Some(transport) = req.header(&headers::TRANSPORT) else {
                            let res = Response::builder(Version::V1_0, StatusCode::UnsupportedTransport).build(Vec::new());
                            conn.write_response(&res).await?;
                            continue;
                        };
                        if !transport.as_str().starts_with("RTP/AVP/TCP") {
                            let res = Response::builder(Version::V1_0, StatusCode::UnsupportedTransport).build(Vec::new());
                            conn.write_response(&res).await?;
                            continue;
                        }

                        let Some(index) = request_track_id(req.request_uri().map(|u| u.as_str()).unwrap_or_default()) else {
                            let res = Response::builder(Version::V1_0, StatusCode::BadRequest).build(Vec::new());
                            conn.write_response(&res).await?;
                            continue;
                        };
                        let Some(media) = announced_medias.get(index) else {
                            let res = Response::builder(Version::V1_0, StatusCode::BadRequest).build(Vec::new());
                            conn.write_response(&res).await?;
                            continue;
                        };

                        let channel = next_channel;
                        next_channel += 2;
                        setup_channels.insert(media.id.clone(), channel);

                        let res = ok_response(&req)
                            .header(headers::TRANSPORT, format!("RTP/AVP/TCP;unicast;interleaved={channel}-{}", channel + 1))
                            .build(Vec::new());
                        conn.write_response(&res).await?;
                    }

                    Method::Play => {
                        let consumer: Arc<dyn Consumer> = Arc::new(SessionConsumer {
                            medias: announced_medias.iter().cloned().map(|mut m| { m.direction = Direction::Sendonly; m }).collect(),
                            channels: setup_channels.clone(),
                            tx: frame_tx.clone(),
                            handles: Mutex::new(Vec::new()),
                            addr: peer_addr.clone(),
                        });
                        if let Some(target) = registry.get_stream(&stream_name) {
                            target.attach_consumer(&registry, consumer.clone()).await?;
                            active_consumer = Some((target, consumer));
                        }
                        let res = ok_response(&req).build(Vec::new());
                        conn.write_response(&res).await?;
                    }

                    Method::Record => {
                        if !record_started.swap(true, Ordering::SeqCst) {
                            if let Some(target) = registry.get_stream(&stream_name) {
                                let recv_medias: Vec<Media> = announced_medias.iter().cloned().map(|mut m| { m.direction = Direction::Recvonly; m }).collect();
                                let producer: Arc<dyn Producer> = Arc::new(SessionProducer {
                                    medias: recv_medias,
                                    tracks: Mutex::new(HashMap::new()),
                                    stopped: Arc::new(Notify::new()),
                                    addr: peer_addr.clone(),
                                });
                                target.add_external_producer(producer, format!("rtsp-record://{peer_addr}"));
                            }
                        }
                        let res = ok_response(&req).build(Vec::new());
                        conn.write_response(&res).await?;
                    }

                    Method::Teardown => {
                        let res = ok_response(&req).build(Vec::new());
                        let _ = conn.write_response(&res).await;
                        let _ = producer.stop().await;
                        if let Some((target, consumer)) = active_consumer.take() {
                            target.remove_consumer(&consumer);
                        }
                        return Ok(());
                    }

                    other => {
                        if let Some((target, consumer)) = active_consumer.take() {
                            target.remove_consumer(&consumer);
                        }
                        return Err(AppError::Protocol(format!("unsupported method: {other}")));
                    }
                }
            }
        }
    }
}

fn ok_response(req: &Request<Vec<u8>>) -> rtsp_types::ResponseBuilder {
    let mut builder = Response::builder(Version::V1_0, StatusCode::Ok);
    if let Some(cseq) = req.header(&headers::CSEQ) {
        builder = builder.header(headers::CSEQ, cseq.as_str());
    }
    builder
}

fn unauthorized_response(req: &Request<Vec<u8>>, nonce: &str) -> Response<Vec<u8>> {
    let mut builder = Response::builder(Version::V1_0, StatusCode::Unauthorized);
    if let Some(cseq) = req.header(&headers::CSEQ) {
        builder = builder.header(headers::CSEQ, cseq.as_str());
    }
    builder
        .header(headers::WWW_AUTHENTICATE, auth::digest_challenge(nonce))
        .build(Vec::new())
}

fn extract_stream_name(uri: &str) -> String {
    uri.rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains('='))
        .unwrap_or_default()
        .to_string()
}

/// `trackID=N` from either the query string or the path's final segment.
fn request_track_id(uri: &str) -> Option<usize> {
    let s = uri.rsplit_once('?').map(|(_, q)| q).unwrap_or(uri);
    let idx = s.rfind('=')?;
    s[idx + 1..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_id_parses_from_query_string() {
        assert_eq!(request_track_id("rtsp://host/stream?trackID=2"), Some(2));
    }

    #[test]
    fn track_id_parses_from_path_segment() {
        assert_eq!(request_track_id("rtsp://host/stream/trackID=1"), Some(1));
    }

    #[test]
    fn stream_name_strips_trailing_track_segment() {
        assert_eq!(extract_stream_name("rtsp://host/front_door"), "front_door");
    }
}
