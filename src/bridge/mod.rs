//! Line-protocol bridge to tool helper processes.
//!
//! A helper is an external program that speaks newline-delimited JSON-RPC
//! over its stdin/stdout. One helper process is spawned per invocation and
//! terminated when the invocation ends.
//!
//! - `codec`: newline framing with a 1 MiB line limit.
//! - `envelope`: outbound requests/notifications, inbound response parsing.
//! - `router`: id-correlated dispatch and the stdout reader task.
//! - `spawner`: process launch with an environment allowlist.
//! - `session`: [`ToolBridge`], the `send` / `await_response` primitives.

pub mod codec;
pub mod envelope;
pub mod router;
pub mod session;
pub mod spawner;

pub use envelope::{Envelope, RpcError, RpcResponse};
pub use session::ToolBridge;
pub use spawner::SpawnConfig;
