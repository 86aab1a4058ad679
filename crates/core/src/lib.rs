#![forbid(unsafe_code)]

//! Domain model for course progress, quiz grading and completion.
//!
//! Everything here is pure: persistence lives in `storage`, orchestration in
//! `services`.

pub mod grading;
pub mod model;
pub mod time;

pub use time::Clock;
