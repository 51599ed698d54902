pub mod config;
pub mod error;
pub mod types;

pub use config::PartsbotConfig;
pub use error::{PartsbotError, Result};
pub use types::*;
