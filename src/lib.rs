#![forbid(unsafe_code)]

//! `chat-relay`: chat backend that enriches each conversation with live tool
//! and store context before forwarding it to a hosted completion API.

pub mod bridge;
pub mod completion;
pub mod config;
pub mod context;
pub mod errors;
pub mod models;
pub mod tools;
pub mod web;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
