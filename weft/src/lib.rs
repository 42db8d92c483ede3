//! # Weft
//!
//! A single-threaded structured-concurrency runtime.
//!
//! Weft drives coroutines ("jobs") cooperatively on one thread and keeps
//! them in a strict ownership tree:
//!
//! - **Structured lifetime**: a job never settles before its children
//! - **Failure cascade**: a failing child cancels its siblings and fails
//!   its parent with a causal chain back to the origin
//! - **Cancellation**: cooperative, with LIFO finalizers and an optional
//!   deadline after which the subtree is force-settled
//! - **Rendezvous channels**: FIFO handoff, buffered or unbuffered
//! - **Combinators**: `wait_all`, `wait_all_or_fail`, `first`,
//!   `first_success`, each owning the jobs it is given
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use weft::prelude::*;
//!
//! let rt = Runtime::lab();
//! let root = rt.spawn("root", |cx| async move {
//!     let chan = cx.channel::<&str>(0);
//!     let tx = chan.clone();
//!     cx.spawn("producer", move |cx| async move {
//!         cx.sleep(Duration::from_millis(10)).await;
//!         tx.put("hi").await?;
//!         Ok(())
//!     });
//!     Ok(chan.rec().await?)
//! });
//!
//! assert_eq!(rt.block_on(&root)?.success(), Some("hi"));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod channel;
pub mod combinators;
pub mod core;
pub mod errors;
pub mod events;
pub mod job;
pub mod observability;
pub mod runtime;
pub mod testing;
pub mod time;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{Cancellation, Finalizer};
    pub use crate::channel::Channel;
    pub use crate::combinators::{first, first_success, wait_all, wait_all_or_fail};
    pub use crate::core::{JobId, JobState, Outcome};
    pub use crate::errors::{
        AggregateFailure, Cause, ChannelError, Failure, RuntimeError, WeftError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::job::{Cx, Job};
    pub use crate::runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
    pub use crate::time::ClockKind;
}
