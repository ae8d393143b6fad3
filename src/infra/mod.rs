//! Infrastructure adapters and runtime bootstrap.

pub mod articles;
pub mod browser;
pub mod error;
pub mod process;
pub mod renderer;
pub mod telemetry;
