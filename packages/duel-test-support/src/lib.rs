//! Shared helpers for the duel crate's integration tests.

pub mod logging;
