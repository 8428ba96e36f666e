pub mod build;
pub mod config;
pub mod error;
pub mod logging;
pub mod units;

pub use error::{Result, TriteError};
