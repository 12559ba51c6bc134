//! Testdrive CLI
//!
//! Command-line interface for resolving Testdrive configurations and
//! serving them to browsers.

pub mod commands;
pub mod output;
