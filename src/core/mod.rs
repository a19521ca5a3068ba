// Public modules
pub mod config;
pub mod env_file;
pub mod error;
pub mod ims;
pub mod pipeline;
pub mod runner;
pub mod token;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
