//! Producer contract (C3): an adapter instance holding an upstream connection.

use async_trait::async_trait;

use crate::error::Result;

use super::media::{Codec, Media};
use super::track::Track;

/// An adapter instance that owns an upstream connection and can hand out
/// receive-tracks for its medias.
///
/// `start()` is blocking and expected to run on a dedicated task; it returns
/// only when the upstream ends. `stop()` may be called concurrently from any
/// task and MUST be idempotent (§5).
#[async_trait]
pub trait Producer: Send + Sync {
    /// Medias this producer can give us, all with `Direction::Recvonly`.
    fn medias(&self) -> Vec<Media>;

    /// Get (lazily creating, if needed) the receive-track for `(media, codec)`.
    async fn get_track(&self, media: &Media, codec: &Codec) -> Result<Track>;

    /// Run until the upstream connection ends or `stop()` is called.
    async fn start(&self) -> Result<()>;

    /// Idempotent: interrupts `start()` by closing the underlying connection.
    async fn stop(&self) -> Result<()>;

    /// Human-readable remote address, for logs and diagnostics.
    fn addr(&self) -> String {
        String::new()
    }
}
