//! Shared Application State
//!
//! `AppState` is created once at startup and handed to every handler and
//! call coordinator.

use crate::{bridge::SessionRegistry, config::Config};
use callbridge_core::endpoint::EndpointProvider;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Live calls, keyed by session id.
    pub registry: Arc<SessionRegistry>,
    /// Source of signed conversation URLs.
    pub endpoints: Arc<dyn EndpointProvider>,
}
