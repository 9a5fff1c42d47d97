//! Routing between connected clients and the child process.
//!
//! The [`MessageRouter`] is the only owner of the session registry. Everything else talks to
//! it through [`GatewayEvent`]s on one channel, which makes the router task the single
//! execution context for routing decisions. Writes to the child's input are queued on a
//! [`StdinWriter`] so that a child not reading its input never stalls routing.

pub mod message_router;
pub mod stdin_writer;
pub mod types;

pub use message_router::MessageRouter;
pub use stdin_writer::StdinWriter;
pub use types::{CloseReason, GatewayEvent};
