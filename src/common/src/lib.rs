//! Configuration and command-line helpers shared by the exporter binaries.

pub mod cli;
pub mod config;
