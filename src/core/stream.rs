//! Stream object (C4): one named forwarding graph, with reference counting
//! and on-demand producer/consumer lifecycle.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration};

use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::warn_throttled;

use super::consumer::Consumer;
use super::matcher::match_media;
use super::producer::Producer;
use super::registry::StreamRegistry;

/// §5: how long a stream may sit with zero consumers before its internal
/// producers are torn down.
const IDLE_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Whether a producer is pinned by configuration ("external") or was created
/// transiently to serve a `play()` pairing ("internal").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    External,
    Internal,
}

/// One active producer attached to a stream, plus (if the same adapter
/// instance can also act as a sink) its consumer side.
pub struct ProducerEntry {
    pub producer: Arc<dyn Producer>,
    pub consumer: Option<Arc<dyn Consumer>>,
    pub state: ProducerState,
    pub url: String,
}

/// Either a URL to resolve via the registry, or an already-constructed
/// producer (optionally bidirectional), as the source for [`Stream::play`].
pub enum PlaySource {
    Url(String),
    Producer(Arc<dyn Producer>, Option<Arc<dyn Consumer>>),
}

struct StreamState {
    producers: Vec<ProducerEntry>,
    consumers: Vec<Arc<dyn Consumer>>,
}

/// Named forwarding graph: sources → producers → consumers.
pub struct Stream {
    name: String,
    /// Configured source URLs, immutable after config load except via the
    /// admin API (which replaces the whole stream entry in the registry).
    sources: Vec<String>,
    state: Mutex<StreamState>,
    /// Pinned uses beyond live consumers (e.g. "always-on" config).
    pins: AtomicI64,
    /// Throttles the "producer unavailable" warning per source URL, so a
    /// source that's down doesn't flood the log on every consumer attach.
    unavailable_warnings: LogThrottler,
}

impl Stream {
    pub fn new(name: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sources,
            state: Mutex::new(StreamState {
                producers: Vec::new(),
                consumers: Vec::new(),
            }),
            pins: AtomicI64::new(0),
            unavailable_warnings: LogThrottler::with_secs(30),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unpin(&self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether this stream has any reason to stay alive: live consumers,
    /// pins, or an externally-configured ("always-on") producer.
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        !state.consumers.is_empty()
            || self.pins.load(Ordering::Acquire) > 0
            || state
                .producers
                .iter()
                .any(|p| p.state == ProducerState::External)
    }

    pub fn producer_count(&self) -> usize {
        self.state.lock().producers.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.state.lock().consumers.len()
    }

    /// Register a producer that should stay attached regardless of
    /// subscriber count (used for "always-on" config entries).
    pub fn add_external_producer(&self, producer: Arc<dyn Producer>, url: String) {
        let mut state = self.state.lock();
        state.producers.push(ProducerEntry {
            producer,
            consumer: None,
            state: ProducerState::External,
            url,
        });
    }

    pub fn add_internal_producer(&self, producer: Arc<dyn Producer>, consumer: Option<Arc<dyn Consumer>>) {
        let mut state = self.state.lock();
        state.producers.push(ProducerEntry {
            producer,
            consumer,
            state: ProducerState::Internal,
            url: "internal".to_string(),
        });
    }

    pub fn add_consumer(&self, consumer: Arc<dyn Consumer>) {
        self.state.lock().consumers.push(consumer);
    }

    /// Detach `consumer`. If this was the stream's last consumer, an idle
    /// reaper is scheduled to stop internal-state producers after a grace
    /// period (§5) in case nothing else attaches in the meantime.
    pub fn remove_consumer(self: &Arc<Self>, consumer: &Arc<dyn Consumer>) {
        let mut state = self.state.lock();
        state.consumers.retain(|c| !Arc::ptr_eq(c, consumer));
        let now_idle = state.consumers.is_empty();
        drop(state);

        if now_idle {
            self.spawn_idle_reaper();
        }
    }

    /// §5: "a stream with no consumers for a grace period stops its internal
    /// producers." Re-checks after the sleep, since a new consumer may have
    /// attached in the meantime; external (config-pinned) producers are left
    /// alone regardless of subscriber count.
    fn spawn_idle_reaper(self: &Arc<Self>) {
        let stream = self.clone();
        tokio::spawn(async move {
            sleep(IDLE_GRACE_PERIOD).await;

            if !stream.state.lock().consumers.is_empty() {
                return;
            }

            let internal: Vec<Arc<dyn Producer>> = stream
                .state
                .lock()
                .producers
                .iter()
                .filter(|p| p.state == ProducerState::Internal)
                .map(|p| p.producer.clone())
                .collect();

            for producer in internal {
                let _ = producer.stop().await;
                stream.remove_producer(&producer);
            }
        });
    }

    pub fn remove_producer(&self, producer: &Arc<dyn Producer>) {
        let mut state = self.state.lock();
        state
            .producers
            .retain(|p| !Arc::ptr_eq(&p.producer, producer));
    }

    /// Snapshot of live producers, for matching against a new consumer.
    pub fn producers_snapshot(&self) -> Vec<(Arc<dyn Producer>, Option<Arc<dyn Consumer>>, ProducerState)> {
        self.state
            .lock()
            .producers
            .iter()
            .map(|p| (p.producer.clone(), p.consumer.clone(), p.state))
            .collect()
    }

    /// Attach `consumer` to this stream: match its medias against every live
    /// producer, lazily instantiating producers from `sources` via `registry`
    /// when none of the currently-live producers can serve it.
    pub async fn attach_consumer(
        self: &Arc<Self>,
        registry: &StreamRegistry,
        consumer: Arc<dyn Consumer>,
    ) -> Result<()> {
        if self.try_match_existing(&consumer).await? {
            self.add_consumer(consumer);
            return Ok(());
        }

        for url in self.sources.clone() {
            let (producer, _) = match registry.get_producer(&url).await {
                Ok(p) => p,
                Err(err) => {
                    warn_throttled!(
                        self.unavailable_warnings,
                        &url,
                        stream = %self.name, url = %url, error = %err, "producer unavailable"
                    );
                    continue;
                }
            };
            if self.try_attach_from_producer(&producer, &consumer).await? {
                // Instantiated on demand by this attach, not pinned by config:
                // internal, so the idle reaper can reclaim it once the last
                // subscriber leaves.
                self.add_internal_producer(producer.clone(), None);
                self.spawn_producer_task(producer);
                self.add_consumer(consumer);
                return Ok(());
            }
        }

        Err(AppError::Negotiation(format!(
            "no producer on stream {} matches consumer {}",
            self.name,
            consumer.addr()
        )))
    }

    async fn try_match_existing(&self, consumer: &Arc<dyn Consumer>) -> Result<bool> {
        let snapshot = self.producers_snapshot();
        for (producer, _, _) in snapshot {
            if self.try_attach_from_producer(&producer, consumer).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn try_attach_from_producer(
        &self,
        producer: &Arc<dyn Producer>,
        consumer: &Arc<dyn Consumer>,
    ) -> Result<bool> {
        for consumer_media in consumer.medias() {
            for producer_media in producer.medias() {
                let Some((producer_codec, consumer_codec)) =
                    match_media(&producer_media, &consumer_media)
                else {
                    continue;
                };

                let track = match producer.get_track(&producer_media, &producer_codec).await {
                    Ok(t) => t,
                    Err(err) => {
                        tracing::warn!(error = %err, "producer refused get_track");
                        continue;
                    }
                };

                if let Err(err) = consumer.add_track(&consumer_media, &consumer_codec, track).await {
                    tracing::warn!(error = %err, "consumer refused add_track");
                    continue;
                }

                return Ok(true);
            }
        }
        Ok(false)
    }

    fn spawn_producer_task(self: &Arc<Self>, producer: Arc<dyn Producer>) {
        let stream = self.clone();
        tokio::spawn(async move {
            if let Err(err) = producer.start().await {
                tracing::warn!(stream = %stream.name, error = %err, "producer ended with error");
            }
            stream.remove_producer(&producer);
        });
    }

    /// §4.3: pull from an external URL (or a pre-built producer) into an
    /// already-active local consumer. The inverse of the usual push flow.
    pub async fn play(self: &Arc<Self>, registry: &StreamRegistry, src: PlaySource) -> Result<()> {
        {
            let state = self.state.lock();
            for entry in state.producers.iter() {
                if entry.state == ProducerState::Internal {
                    let producer = entry.producer.clone();
                    tokio::spawn(async move {
                        let _ = producer.stop().await;
                    });
                }
            }
        }

        let (mut source, url_for_log): (Option<Arc<dyn Producer>>, String) = match src {
            PlaySource::Url(url) if url.is_empty() => return Ok(()),
            PlaySource::Url(url) => (None, url),
            PlaySource::Producer(producer, _) => (Some(producer), "<producer>".to_string()),
        };

        // Step 2: loopback — an existing producer whose connection also
        // implements Consumer may itself ingest the new source directly.
        let snapshot = self.producers_snapshot();
        for (_, maybe_consumer, _) in &snapshot {
            let Some(consumer) = maybe_consumer else {
                continue;
            };

            if source.is_none() {
                source = Some(registry.get_producer(&url_for_log).await?.0);
            }
            let src_producer = source.clone().unwrap();

            if self.try_attach_from_producer(&src_producer, consumer).await? {
                self.add_internal_producer(src_producer.clone(), None);
                self.spawn_producer_task(src_producer);
                return Ok(());
            }
        }

        // Step 3: instantiate a destination producer from a configured
        // source URL, verify it is also a Consumer, and pair it against the
        // new source.
        for dest_url in self.sources.clone() {
            let (dest, dest_as_consumer) = match registry.get_producer(&dest_url).await {
                Ok((p, Some(c))) => (p, c),
                Ok((p, None)) => {
                    tokio::spawn(async move {
                        let _ = p.stop().await;
                    });
                    continue;
                }
                Err(_) => continue,
            };

            if source.is_none() {
                source = Some(registry.get_producer(&url_for_log).await?.0);
            }
            let src_producer = source.clone().unwrap();

            if !self
                .try_attach_from_producer(&src_producer, &dest_as_consumer)
                .await?
            {
                let _ = dest.stop().await;
                continue;
            }

            self.add_internal_producer(dest.clone(), Some(dest_as_consumer));
            self.add_internal_producer(src_producer.clone(), None);

            let stream_for_dest = self.clone();
            let dest_for_task = dest.clone();
            tokio::spawn(async move {
                let _ = dest_for_task.start().await;
                stream_for_dest.remove_producer(&dest_for_task);
            });

            let stream_for_src = self.clone();
            let src_for_task = src_producer.clone();
            let dest_for_drain = dest.clone();
            tokio::spawn(async move {
                let _ = src_for_task.start().await;
                // Drain delay so buffered packets reach the peer before the
                // destination is torn down.
                sleep(Duration::from_secs(1)).await;
                let _ = dest_for_drain.stop().await;
                stream_for_src.remove_producer(&src_for_task);
            });

            return Ok(());
        }

        Err(AppError::Negotiation("can't find consumer".to_string()))
    }
}
