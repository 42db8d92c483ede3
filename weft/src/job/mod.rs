//! Job handles and the per-job context.

mod context;
mod handle;

pub use context::Cx;
pub use handle::{Join, Job, OutcomeFuture};
