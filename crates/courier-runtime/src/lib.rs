//! Courier Runtime
//!
//! This crate drives the session components of `courier-core` against a live
//! messaging client:
//! - `EventLoop`: spawns the single driver task and joins it on stop
//! - `BotContext`: exclusive owner of every pending table
//! - `dispatch`: routes responses to handlers and updates by kind
//! - `BotHandle`: channel-based access for producers on other tasks
//!
//! All session state is mutated by the driver task alone; other tasks talk to
//! it through commands.

pub mod context;
pub mod dispatch;
pub mod event_loop;
pub mod handle;
pub mod handlers;
pub mod responder;

pub use context::{BotContext, BotStats, SharedTimeSource};
pub use dispatch::dispatch;
pub use event_loop::EventLoop;
pub use handle::{create_command_channel, BotHandle, Command, CommandReceiver, CommandSender};
pub use responder::{EchoResponder, InboundText, Responder};

// Re-export core types for convenience
pub use courier_core::{BotConfig, CourierError, CourierResult, RestartPolicy};
