//! Testing utilities: outcome assertions, a side-effect recorder and a
//! deterministic runtime.

mod assertions;
mod fixtures;

pub use assertions::{
    assert_cancelled, assert_cancelled_by, assert_failed, assert_failed_with_origin,
    assert_succeeded, assert_timed_out,
};
pub use fixtures::{lab_runtime, Recorder};
