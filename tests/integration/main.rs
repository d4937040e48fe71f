//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one part of the server
//! against the journaling mocks in `mock_hw` or the simulated platform.
//! Everything runs on the host.

mod mock_hw;
mod sweeper_tests;
mod worker_tests;
