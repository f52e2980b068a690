//! vigild server library: storage backends, request dispatch, lifecycle.

pub mod config;
pub mod grpc;
pub mod http;
pub mod state;
pub mod storage;

pub use config::{Mode, ServerConfig};
pub use state::AppState;
