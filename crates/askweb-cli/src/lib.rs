//! `askweb` crate (library surface).
//!
//! End users run the `askweb` binary. The modules here hold its configuration
//! and console loop so they can be embedded or tested without a child process.

pub mod chat;
pub mod config;

pub use askweb_core as core;
pub use askweb_local as local;
