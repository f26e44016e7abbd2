//! Aurora: realtime chat relay with a market quote ticker.
//!
//! The binary wires configuration into [`state::AppState`], starts the
//! background workers in [`ticker`] and serves [`routes::build_router`].

pub mod routes;
pub mod state;
pub mod ticker;
pub mod ws;

pub use routes::build_router;
pub use state::AppState;
