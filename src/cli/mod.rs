//! CLI-specific functionality for scriptorium
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, DocumentConfig, ExecutionMode, GlobalOptions, SummarizeConfig};
pub use config::{ConfigDiscovery, SuiteConfig};
