//! Generic utility primitives with zero domain knowledge.
//!
//! - `io` - File I/O with consistent error handling
//! - `split` - Quote-aware command line splitting

pub mod io;
pub mod split;
