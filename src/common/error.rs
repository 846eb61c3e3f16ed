//! Error type for the seams that need more than a bare `bool`/`Option`
//! (pool exhaustion surfacing out of the tree, disk I/O
//! propagating as fatal). Recoverable, expected outcomes (page absent, key
//! duplicate/missing) stay `bool`/`Option` at the call site, matching the
//! buffer pool and index APIs themselves.

use std::fmt;

use crate::common::config::PageId;

#[derive(Debug)]
pub enum Error {
    /// No free frame and no evictable frame was available.
    PoolExhausted,
    /// A page was requested that is not resident and the caller expected it
    /// to be (used by callers that treat a missing page as a programmer
    /// error rather than an expected absence).
    PageNotFound(PageId),
    /// The disk manager's underlying file I/O failed.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolExhausted => write!(f, "buffer pool exhausted: no frame available"),
            Error::PageNotFound(page_id) => write!(f, "page {page_id} not found in buffer pool"),
            Error::Io(e) => write!(f, "disk I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
