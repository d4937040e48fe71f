//! Platform boundary.
//!
//! The server core talks to engines, the accelerator, the cache and shared
//! memory only through the traits in [`ports`].

pub mod ports;
