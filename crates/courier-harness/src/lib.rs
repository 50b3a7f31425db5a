//! Courier Harness
//!
//! In-memory stand-ins for the messaging client: a scripted client whose
//! inbound queue is fed from the outside, a simulated backend that answers
//! requests, builders for inbound objects, and a manual clock.

pub mod client;
pub mod fixtures;
pub mod server;
pub mod time;

pub use client::{AutoReply, ScriptHandle, ScriptedClient, ScriptedFactory};
pub use server::{SimulatedServer, FIRST_DURABLE_ID};
pub use time::ManualTimeSource;
