//! RTSP transport (C6): wire framing, SDP translation, auth, and both the
//! server (accepts player/pusher connections) and client (dials cameras)
//! sides of the protocol.

pub mod auth;
pub mod client;
pub mod sdp;
pub mod server;
pub mod wire;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::core::registry::{ProducerFactory, ResolvedProducer, StreamRegistry};
use crate::error::Result;

pub use client::RtspClientProducer;

/// Register the `rtsp:` scheme so `StreamRegistry::get_producer` can dial
/// out to cameras.
pub fn register_scheme(registry: &StreamRegistry) {
    registry.register_scheme("rtsp", Arc::new(RtspSchemeFactory));
}

struct RtspSchemeFactory;

impl ProducerFactory for RtspSchemeFactory {
    fn build(
        &self,
        url: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ResolvedProducer>> + Send>> {
        let url = url.to_string();
        Box::pin(async move {
            let producer = RtspClientProducer::connect(&url).await?;
            Ok((Arc::new(producer) as Arc<dyn crate::core::producer::Producer>, None))
        })
    }
}

/// Accept loop for the RTSP server: one task per connection, run until the
/// listener is closed.
pub async fn listen(
    addr: &str,
    registry: Arc<StreamRegistry>,
    credentials: Option<(String, String)>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "rtsp server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = registry.clone();
        let credentials = credentials.clone();
        tokio::spawn(async move {
            if let Err(err) = server::serve_connection(stream, registry, credentials).await {
                tracing::warn!(%peer, error = %err, "rtsp connection ended");
            }
        });
    }
}
