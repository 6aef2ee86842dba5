//! Deterministic, pure logic shared by the CEIL pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod path;
pub mod render;
pub mod retry;
pub mod run_target;
pub mod sanitize;
pub mod token;
pub mod types;
