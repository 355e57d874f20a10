pub mod auth;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod rooms;
pub mod router;
pub mod socket;
pub mod state;
pub mod types;

pub use error::AppError;
pub use state::{AppState, build_state, build_state_with_adapters};
