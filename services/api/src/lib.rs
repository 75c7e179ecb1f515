//! Voxbridge API Library Crate
//!
//! This library contains the HTTP surface for the voxbridge engine: the
//! application state, request/response models, API handlers, and routing.
//! The `api` binary is a thin wrapper around this library; all session and
//! protocol logic lives in `voxbridge-core`.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
