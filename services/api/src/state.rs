//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared
//! resources every handler needs: the session registry and the loaded
//! configuration.

use crate::config::Config;
use std::sync::Arc;
use voxbridge_core::SessionRegistry;

/// The shared application state, created once at startup and passed to all
/// handlers.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}
