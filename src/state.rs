use std::sync::Arc;

use crate::engine::ChatEngine;
use crate::sessions::SessionRegistry;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub sessions: Arc<SessionRegistry>,
}
