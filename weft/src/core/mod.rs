//! Core domain model types for weft.
//!
//! This module contains the fundamental types used throughout the runtime:
//! - Job identity and lifecycle state
//! - Settled outcomes, typed and erased

mod id;
mod outcome;
mod status;

pub use id::JobId;
pub use outcome::Outcome;
pub(crate) use outcome::Settlement;
pub use status::JobState;
