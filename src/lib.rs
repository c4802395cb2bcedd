//! Quick Notes: a small note-taking HTTP API that keeps one JSON file per
//! user on disk.
//!
//! Every `POST /api` call passes the same gate before its action runs:
//! the IP firewall ([`firewall`]), then the brute-force throttle
//! ([`brute_force`]), then action dispatch ([`routes::dispatch`]).

pub mod api_key;
pub mod auth;
pub mod brute_force;
pub mod config;
pub mod db;
pub mod error;
pub mod firewall;
pub mod models;
pub mod note_handlers;
pub mod routes;
pub mod state;
pub mod user_handlers;

pub use config::Settings;
pub use error::ApiError;
pub use routes::configure;
pub use state::AppState;
