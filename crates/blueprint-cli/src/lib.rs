//! Blueprint CLI - the `blueprint` binary and the HTTP functions it serves.
//!
//! Each function lives in [`functions`] as an axum handler; [`server`]
//! mounts them and [`state`] wires in the remote services.

pub mod config;
pub mod functions;
pub mod server;
pub mod state;

pub use config::{Command, Config};
pub use server::build_router;
pub use state::{AppState, Backends, Catalogs, HttpBackends, SharedState};
