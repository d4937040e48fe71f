//! Remote-side codec engine server library.
//!
//! Exposes the server core (registry, coherency gate, capability table,
//! handlers, sweeper) and the simulated platform for integration testing.
//! Real hardware sits behind the traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod codec;
pub mod coherency;
pub mod config;
pub mod error;
pub mod handle;
pub mod registry;
pub mod rpc;
