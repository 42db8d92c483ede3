//! Job combinators.
//!
//! Each combinator spawns its own job, adopts the jobs handed to it (so
//! cancelling the combinator cancels every member) and watches them through
//! a completion channel. Members are observed, so their failures are
//! reported through the combinator instead of cascading into their former
//! parent.

mod observe;
mod race;
mod wait;

#[cfg(test)]
mod combinator_tests;

pub use race::{first, first_success};
pub use wait::{wait_all, wait_all_or_fail};
