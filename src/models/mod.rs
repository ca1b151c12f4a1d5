//! Domain model module declarations.

pub mod chat;
pub mod resource;
pub mod time;
