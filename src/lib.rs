//! quayd - multi-tenant chat gateway.
//!
//! Clients authenticate once over a persistent WebSocket connection, join
//! one channel at a time, and exchange messages that are durably stored
//! and fanned out to the channel's live membership. Server/channel CRUD
//! beyond the transactional invariants the gateway depends on lives in an
//! external service.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod network;
pub mod state;
