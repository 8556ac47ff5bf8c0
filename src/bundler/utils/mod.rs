//! Shared helpers for pipeline stages.

pub mod fs;
pub mod http;
pub mod process;
