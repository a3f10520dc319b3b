//! Network layer: WebSocket listener and per-connection tasks.

mod connection;
mod gateway;

pub use connection::{Connection, ConnectionShared};
pub use gateway::Gateway;
