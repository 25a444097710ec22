//! Archive-period statistics
//!
//! Tracks archive-period boundaries from record timestamps and keeps the
//! running wind gust maximum for the current period.

pub mod gust;
pub mod period;

pub use gust::*;
pub use period::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
