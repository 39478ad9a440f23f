//! Shared building blocks for the space mailer workspace

mod compare;
mod error;
mod secret;

pub use compare::constant_time_eq;
pub use error::{Error, Result};
pub use secret::Secret;
