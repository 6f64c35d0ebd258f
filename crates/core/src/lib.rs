//! Core error taxonomy shared by every Eirenyx crate.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod duration_secs;
pub mod error;
pub mod result;

pub use error::{Error, ORPHAN_RETRY_DELAY, RETRY_DELAY};
pub use result::{Result, ResultExt};
