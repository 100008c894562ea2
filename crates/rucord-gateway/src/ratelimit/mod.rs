//! Rate limiting
//!
//! Identify spacing per concurrency bucket, and the outbound command budget
//! of a single connection.

mod commands;
mod identify;

pub use commands::CommandRateLimiter;
pub use identify::{IdentifyPermit, IdentifyRateLimiter, IDENTIFY_WINDOW};
