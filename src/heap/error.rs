//! Errors from heap pages and heap files.

use std::fmt;
use std::io;

use crate::datum::SerializationError;
use crate::storage::PageId;
use crate::tuple::RecordId;

/// Errors from heap operations.
#[derive(Debug)]
pub enum HeapError {
    /// The tuple's schema does not match the table's schema.
    SchemaMismatch,
    /// The page has no free slot.
    PageFull(PageId),
    /// The addressed slot is not in use.
    SlotVacant {
        /// Page holding the slot.
        pid: PageId,
        /// Slot number.
        slot: usize,
    },
    /// The tuple's record id references a different page.
    WrongPage {
        /// Where the tuple claims to live.
        rid: RecordId,
        /// The page the operation ran against.
        pid: PageId,
    },
    /// The tuple has no record id, so it cannot be located on disk.
    MissingRecordId,
    /// The requested page lies past the end of the file.
    PageOutOfBounds {
        /// The requested page.
        pid: PageId,
        /// Pages currently in the file.
        page_count: u32,
    },
    /// The file or a page image has an invalid format.
    Corrupted(String),
    /// Field (de)serialization failed.
    Serialization(SerializationError),
    /// I/O error from the underlying file.
    Io(io::Error),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::SchemaMismatch => {
                write!(f, "tuple schema does not match the table schema")
            }
            HeapError::PageFull(pid) => write!(f, "page {} has no free slot", pid),
            HeapError::SlotVacant { pid, slot } => {
                write!(f, "slot {} of page {} is not in use", slot, pid)
            }
            HeapError::WrongPage { rid, pid } => {
                write!(f, "record {} does not live on page {}", rid, pid)
            }
            HeapError::MissingRecordId => {
                write!(f, "tuple has no record id")
            }
            HeapError::PageOutOfBounds { pid, page_count } => {
                write!(
                    f,
                    "page {} is out of bounds (file has {} pages)",
                    pid, page_count
                )
            }
            HeapError::Corrupted(msg) => write!(f, "corrupted heap data: {}", msg),
            HeapError::Serialization(err) => write!(f, "serialization error: {}", err),
            HeapError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for HeapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HeapError::Serialization(err) => Some(err),
            HeapError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SerializationError> for HeapError {
    fn from(err: SerializationError) -> Self {
        HeapError::Serialization(err)
    }
}

impl From<io::Error> for HeapError {
    fn from(err: io::Error) -> Self {
        HeapError::Io(err)
    }
}
