//! Adapter shell (C8): two worked-example schemes showing how a new source
//! type registers itself with the [`StreamRegistry`](crate::core::StreamRegistry) —
//! a subprocess producer (`exec:`) and a redirect scheme (`expr:`).

pub mod exec;
pub mod expr;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::registry::{ProducerFactory, ResolvedProducer, StreamRegistry};
use crate::error::Result;

struct ExecSchemeFactory;

impl ProducerFactory for ExecSchemeFactory {
    fn build(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedProducer>> + Send>> {
        let url = url.to_string();
        Box::pin(async move {
            let producer = exec::ExecProducer::new(&url)?;
            Ok((Arc::new(producer) as Arc<dyn crate::core::producer::Producer>, None))
        })
    }
}

/// Register every adapter scheme this crate ships with.
pub fn register_all(registry: &StreamRegistry) {
    registry.register_scheme("exec", Arc::new(ExecSchemeFactory));
    registry.register_redirector("expr", Arc::new(expr::ExprRedirector));
    crate::rtsp::register_scheme(registry);
}
