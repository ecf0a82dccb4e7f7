//! Stream registry (C1): name → [`Stream`] lookup and URL → producer
//! resolution, including scheme dispatch and redirect-expression handling.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{AppError, Result};

use super::consumer::Consumer;
use super::producer::Producer;
use super::relay::RelayProducer;
use super::stream::Stream;

/// What a scheme factory hands back: the producer, and (when the same
/// connection can also sink media) its consumer side.
pub type ResolvedProducer = (Arc<dyn Producer>, Option<Arc<dyn Consumer>>);

type FactoryFuture = Pin<Box<dyn Future<Output = Result<ResolvedProducer>> + Send>>;

/// Constructs a producer (and optionally its consumer side) from a URL whose
/// scheme this factory was registered for.
pub trait ProducerFactory: Send + Sync {
    fn build(&self, url: &str) -> FactoryFuture;
}

impl<F, Fut> ProducerFactory for F
where
    F: Fn(&str) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResolvedProducer>> + Send + 'static,
{
    fn build(&self, url: &str) -> FactoryFuture {
        Box::pin(self(url))
    }
}

/// Rewrites a URL before scheme dispatch (`expr:`'s job). Returning the same
/// string unchanged is a no-op; registries cap the rewrite chain at 8 hops.
pub trait Redirector: Send + Sync {
    fn resolve(&self, url: &str) -> Result<String>;
}

const MAX_REDIRECTS: u32 = 8;

struct Registries {
    streams: HashMap<String, Arc<Stream>>,
    factories: HashMap<String, Arc<dyn ProducerFactory>>,
    redirectors: HashMap<String, Arc<dyn Redirector>>,
}

/// Process-wide table of configured streams and adapter schemes.
pub struct StreamRegistry {
    inner: Mutex<Registries>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registries {
                streams: HashMap::new(),
                factories: HashMap::new(),
                redirectors: HashMap::new(),
            }),
        }
    }

    pub fn register_scheme(&self, scheme: &str, factory: Arc<dyn ProducerFactory>) {
        self.inner
            .lock()
            .factories
            .insert(scheme.to_string(), factory);
    }

    pub fn register_redirector(&self, scheme: &str, redirector: Arc<dyn Redirector>) {
        self.inner
            .lock()
            .redirectors
            .insert(scheme.to_string(), redirector);
    }

    pub fn add_stream(&self, name: impl Into<String>, sources: Vec<String>) -> Arc<Stream> {
        let name = name.into();
        let stream = Arc::new(Stream::new(name.clone(), sources));
        self.inner.lock().streams.insert(name, stream.clone());
        stream
    }

    pub fn remove_stream(&self, name: &str) -> Option<Arc<Stream>> {
        self.inner.lock().streams.remove(name)
    }

    pub fn get_stream(&self, name: &str) -> Option<Arc<Stream>> {
        self.inner.lock().streams.get(name).cloned()
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.inner.lock().streams.keys().cloned().collect()
    }

    fn scheme_of(url: &str) -> Option<&str> {
        url.split_once(':').map(|(scheme, _)| scheme)
    }

    /// Resolve `url` into a live producer: apply redirects (bounded), dispatch
    /// on scheme to the registered factory, or treat a bare name / an
    /// `rtsp://internal/<name>` URL as a relay onto another registered stream.
    pub async fn get_producer(&self, url: &str) -> Result<ResolvedProducer> {
        let mut current = url.to_string();

        for _ in 0..MAX_REDIRECTS {
            let Some(scheme) = Self::scheme_of(&current) else {
                return self.relay_producer(&current).await;
            };

            if let Some(name) = current.strip_prefix("rtsp://internal/") {
                return self.relay_producer(name).await;
            }

            let redirector = self.inner.lock().redirectors.get(scheme).cloned();
            if let Some(redirector) = redirector {
                current = redirector.resolve(&current)?;
                continue;
            }

            let factory = self.inner.lock().factories.get(scheme).cloned();
            return match factory {
                Some(factory) => factory.build(&current).await,
                None => Err(AppError::Unresolved(format!("unknown scheme: {scheme}"))),
            };
        }

        Err(AppError::Unresolved(format!(
            "too many redirects resolving {url}"
        )))
    }

    async fn relay_producer(&self, name: &str) -> Result<ResolvedProducer> {
        let stream = self
            .get_stream(name)
            .ok_or_else(|| AppError::Unresolved(format!("no stream named {name}")))?;
        let relay: Arc<dyn Producer> = Arc::new(RelayProducer::new(stream));
        Ok((relay, None))
    }
}
