pub mod control;
pub mod error;
pub mod localization;
pub mod models;
pub mod utils;

pub use error::{Error, Result};
