//! `cartoon` command-line driver library.
//!
//! Re-exports internal modules for testing. The binary entrypoint lives
//! in `main.rs`.

pub mod args;
pub mod config;
pub mod render;
pub mod runner;
