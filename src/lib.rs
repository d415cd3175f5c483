//! broker-relay: chat-completion relay with broker-issued per-user tokens
//!
//! Features:
//! - Exchanges a host user's OIDC identity for an API token at a token broker
//! - Forwards chat completions to an OpenAI-compatible backend, relaying
//!   buffered JSON and event streams
//! - Lists the backend's chat models with a shared token
//! - An "enable model access" tool that stores a direct connection in the
//!   user's settings, reporting progress as UI events

pub mod access;
pub mod broker;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod forward;
pub mod host;
pub mod identity;
pub mod server;

pub use config::AppConfig;
pub use error::RelayError;
pub use server::{router, run_server, RelayState};
