//! Application services: the card generation pipeline and its stages.

pub mod capture;
pub mod eligibility;
pub mod error;
pub mod pipeline;
pub mod projection;
pub mod render;
pub mod scratch;
pub mod store;
