//! Route modules. Each exposes `router() -> Router<AppState>`.

pub mod auth;
pub mod p2p;
pub mod registry;
