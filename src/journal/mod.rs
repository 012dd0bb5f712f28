//! Journal storage backend
//!
//! The byte-addressed durable log underneath the metadata journal. The
//! journal core hands it serialized batches and consumes its asynchronous
//! acknowledgements; replay reads the stream back through [`RecordReader`].
//!
//! # Guarantees
//!
//! - Appends are applied in submission order
//! - An append is acknowledged only after the device has synced it
//! - A failed append is all-or-nothing and fails every later append
//! - Every record carries a CRC32 checksum
//!
//! # Devices
//!
//! - `MemoryDevice` - shared in-memory buffer, with fault injection
//! - `FileDevice` - `journal.log` + `journal.head` in a directory

mod device;
mod errors;
mod head;
mod journaler;
mod reader;
mod record;

pub use device::{FileDevice, LogDevice, MemoryDevice};
pub use errors::{JournalError, JournalResult, Severity};
pub use head::{JournalHead, HEAD_FORMAT_VERSION};
pub use journaler::{AppendCallback, JournalBackend, Journaler, RecoveredJournal, WriteBatch};
pub use reader::RecordReader;
pub use record::{
    compute_checksum, DecodeError, JournalRecord, RecordKind, RECORD_HEADER_SIZE,
    RECORD_OVERHEAD, RECORD_TRAILER_SIZE,
};

use std::path::Path;
use std::sync::Arc;

/// Backend over an in-memory device. Returns the device handle for inspection.
pub fn memory_backend() -> (Arc<dyn JournalBackend>, MemoryDevice) {
    let device = MemoryDevice::new();
    (Arc::new(Journaler::new(device.clone())), device)
}

/// Backend over a file device in `dir`.
pub fn file_backend(dir: &Path) -> JournalResult<Arc<dyn JournalBackend>> {
    let device = FileDevice::open(dir)
        .map_err(|e| JournalError::io(format!("failed to open {}", dir.display()), e))?;
    Ok(Arc::new(Journaler::new(device)))
}
