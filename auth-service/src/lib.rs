pub mod accounts;
pub mod app;
pub mod config;
pub mod cookies;
pub mod error;
pub mod login;
pub mod memory;
pub mod metrics;
pub mod password;
pub mod refresh;
pub mod revocation;
pub mod session_handlers;
pub mod sessions;
pub mod tokens;
pub mod user_handlers;

pub use app::{router, spawn_session_sweeper, AppState, Stores};
pub use error::{SessionError, SessionResult, StoreError};
