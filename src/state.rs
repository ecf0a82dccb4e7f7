//! Process-wide shared state handed to the admin HTTP API and the RTSP server.

use std::sync::Arc;

use crate::config::ConfigStore;
use crate::core::StreamRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigStore,
    pub registry: Arc<StreamRegistry>,
}
