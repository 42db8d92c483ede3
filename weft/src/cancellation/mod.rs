//! The cancellation protocol.
//!
//! Cancelling a job marks it `Cancelling`, drops its suspended body (so no
//! further step of it runs), cancels its timeout, and recursively cancels
//! its children while its finalizers run. It settles once both are done.
//! An optional deadline races the whole sequence; when it fires first the
//! job's subtree is force-settled bottom-up without waiting any further.

mod cleanup;
mod handle;
mod protocol;


pub use cleanup::Finalizer;
pub(crate) use cleanup::run_finalizers;
pub use handle::Cancellation;
