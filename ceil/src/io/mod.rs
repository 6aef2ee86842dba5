//! I/O helpers for ceil commands.

pub mod config;
pub mod context;
pub mod generator;
pub mod init;
pub mod process;
pub mod prompt;
pub mod session_log;
