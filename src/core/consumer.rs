//! Consumer contract (C3): an adapter instance representing one downstream
//! session.

use async_trait::async_trait;

use crate::error::Result;

use super::media::{Codec, Media};
use super::track::Track;

/// An adapter instance representing one downstream session. A single adapter
/// type may implement both [`Producer`](super::producer::Producer) and
/// `Consumer` (RTSP does).
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Medias this consumer wants to receive, all with `Direction::Sendonly`.
    fn medias(&self) -> Vec<Media>;

    /// Subscribe this consumer to `track`, using `codec` (the consumer-side
    /// codec chosen by the matcher) for `media`.
    async fn add_track(&self, media: &Media, codec: &Codec, track: Track) -> Result<()>;

    fn addr(&self) -> String {
        String::new()
    }
}
