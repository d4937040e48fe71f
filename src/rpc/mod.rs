//! Transport-agnostic RPC front-end of the codec engine server.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RPC Stack                             │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │ Mailbox  │──▶│  Worker  │──▶│ DceServer (dispatch)  │  │
//! │  │ (queues) │   │ (serial) │   │  bind → handlers      │  │
//! │  └──────────┘   └──────────┘   └───────────────────────┘  │
//! │       ▲                                    │               │
//! │       │      framed Response               │               │
//! │       └────────────────────────────────────┘               │
//! │                                                            │
//! │  disconnect notice ──▶ Worker ──▶ sweeper                 │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod codec;
mod handlers;
pub mod message;
pub mod server;
pub mod signature;
pub mod sweeper;
pub mod worker;

pub use channels::Mailbox;
pub use server::{DceServer, PowerEvent};
pub use sweeper::SweepReport;
pub use worker::Worker;
