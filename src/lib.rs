// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod clipboard;
pub mod config;
pub mod cycle;
pub mod hub;
pub mod protocol;
pub mod solver;
pub mod ws_server;
