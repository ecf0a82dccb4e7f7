//! Internal relay (§4.1): exposes one stream's live producer medias as a
//! producer for another stream, so `rtsp://internal/<name>` and bare stream
//! names can be used as a source URL.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};

use super::media::Media;
use super::producer::Producer;
use super::stream::Stream;
use super::track::Track;

pub struct RelayProducer {
    stream: Arc<Stream>,
}

impl RelayProducer {
    pub fn new(stream: Arc<Stream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Producer for RelayProducer {
    fn medias(&self) -> Vec<Media> {
        self.stream
            .producers_snapshot()
            .into_iter()
            .flat_map(|(producer, _, _)| producer.medias())
            .collect()
    }

    async fn get_track(&self, media: &Media, codec: &crate::core::media::Codec) -> Result<Track> {
        for (producer, _, _) in self.stream.producers_snapshot() {
            if producer.medias().iter().any(|m| m.id == media.id) {
                return producer.get_track(media, codec).await;
            }
        }
        Err(AppError::Unresolved(format!(
            "no live producer on stream {} serves media {}",
            self.stream.name(),
            media.id
        )))
    }

    /// The underlying producer's lifecycle belongs to its own stream; the
    /// relay has nothing of its own to run.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn addr(&self) -> String {
        format!("internal/{}", self.stream.name())
    }
}
