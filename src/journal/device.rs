//! Byte-addressed log devices
//!
//! A device stores the raw record stream at logical offsets plus the
//! journal head. Devices are synchronous; the [`Journaler`] drives them from
//! its writer thread.
//!
//! [`Journaler`]: super::Journaler

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::head::JournalHead;

/// Synchronous storage for the record stream and head.
pub trait LogDevice: Send + 'static {
    /// Discard any existing contents and persist `head` as a new journal.
    fn reset(&mut self, head: &JournalHead) -> io::Result<()>;

    /// Read the persisted head, or `None` if no journal exists.
    fn read_head(&mut self) -> io::Result<Option<JournalHead>>;

    /// Persist a new head atomically.
    fn write_head(&mut self, head: &JournalHead) -> io::Result<()>;

    /// Logical end of the stored bytes.
    fn len(&mut self) -> io::Result<u64>;

    /// Append `bytes` at logical `offset`, which must equal the current end.
    fn append(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;

    /// Make every appended byte durable.
    fn sync(&mut self) -> io::Result<()>;

    /// Read everything from `offset` to the end.
    fn read_from(&mut self, offset: u64) -> io::Result<Vec<u8>>;

    /// Discard stored bytes past `len`.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

fn offset_mismatch(expected: u64, actual: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("append at offset {} but device ends at {}", expected, actual),
    )
}

#[derive(Debug, Default)]
struct MemoryState {
    head: Option<JournalHead>,
    data: Vec<u8>,
    synced: usize,
    fail_appends: bool,
}

/// In-memory device.
///
/// Clones share storage, so a test can keep one handle to inspect the
/// stream, inject failures, or reopen the journal after shutdown.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDevice {
    /// Create an empty device with no journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later append fail with an I/O error (or stop failing).
    pub fn set_fail_appends(&self, fail: bool) {
        self.state.lock().fail_appends = fail;
    }

    /// Copy of the stored record stream.
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    /// Bytes made durable by `sync`.
    pub fn synced_len(&self) -> u64 {
        self.state.lock().synced as u64
    }

    /// Overwrite one stored byte, for corruption tests.
    pub fn corrupt_byte(&self, offset: u64) {
        let mut state = self.state.lock();
        if let Some(byte) = state.data.get_mut(offset as usize) {
            *byte ^= 0xFF;
        }
    }

    /// Drop stored bytes past `len`, simulating a torn write.
    pub fn tear_tail(&self, len: u64) {
        let mut state = self.state.lock();
        state.data.truncate(len as usize);
        state.synced = state.synced.min(state.data.len());
    }

    /// Currently persisted head.
    pub fn head(&self) -> Option<JournalHead> {
        self.state.lock().head.clone()
    }
}

impl LogDevice for MemoryDevice {
    fn reset(&mut self, head: &JournalHead) -> io::Result<()> {
        let mut state = self.state.lock();
        state.data.clear();
        state.data.resize(head.expire_pos as usize, 0);
        state.synced = state.data.len();
        state.head = Some(head.clone());
        Ok(())
    }

    fn read_head(&mut self) -> io::Result<Option<JournalHead>> {
        Ok(self.state.lock().head.clone())
    }

    fn write_head(&mut self, head: &JournalHead) -> io::Result<()> {
        self.state.lock().head = Some(head.clone());
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.state.lock().data.len() as u64)
    }

    fn append(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_appends {
            return Err(io::Error::new(io::ErrorKind::Other, "injected append failure"));
        }
        let end = state.data.len() as u64;
        if offset != end {
            return Err(offset_mismatch(offset, end));
        }
        state.data.extend_from_slice(bytes);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.synced = state.data.len();
        Ok(())
    }

    fn read_from(&mut self, offset: u64) -> io::Result<Vec<u8>> {
        let state = self.state.lock();
        let start = (offset as usize).min(state.data.len());
        Ok(state.data[start..].to_vec())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.tear_tail(len);
        Ok(())
    }
}

/// File-backed device.
///
/// Layout under the journal directory:
/// - `journal.log` - record stream; file offset equals logical offset
/// - `journal.head` - JSON head, replaced atomically via rename
pub struct FileDevice {
    dir: PathBuf,
    log_path: PathBuf,
    head_path: PathBuf,
    file: Option<File>,
}

impl FileDevice {
    /// Log file name.
    pub const LOG_FILE: &'static str = "journal.log";
    /// Head file name.
    pub const HEAD_FILE: &'static str = "journal.head";

    /// Open a device rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> io::Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            log_path: dir.join(Self::LOG_FILE),
            head_path: dir.join(Self::HEAD_FILE),
            file: None,
        })
    }

    /// Journal directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.log_path)?,
        };
        Ok(self.file.insert(file))
    }

    fn sync_dir(&self) -> io::Result<()> {
        // Directory fsync makes renames and creations durable on unix.
        #[cfg(unix)]
        {
            File::open(&self.dir)?.sync_all()?;
        }
        Ok(())
    }
}

impl LogDevice for FileDevice {
    fn reset(&mut self, head: &JournalHead) -> io::Result<()> {
        self.file = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)?;
        if head.expire_pos > 0 {
            file.set_len(head.expire_pos)?;
        }
        file.sync_all()?;
        drop(file);

        self.write_head(head)
    }

    fn read_head(&mut self) -> io::Result<Option<JournalHead>> {
        let bytes = match fs::read(&self.head_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        JournalHead::from_json(&bytes)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn write_head(&mut self, head: &JournalHead) -> io::Result<()> {
        let bytes = head
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp_path = self.dir.join(format!("{}.tmp", Self::HEAD_FILE));

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.head_path)?;
        self.sync_dir()
    }

    fn len(&mut self) -> io::Result<u64> {
        match fs::metadata(&self.log_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn append(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let end = self.len()?;
        if offset != end {
            return Err(offset_mismatch(offset, end));
        }
        let file = self.log_file()?;
        if let Err(e) = file.write_all(bytes) {
            // All-or-nothing: cut back any partial write.
            let _ = file.set_len(end);
            return Err(e);
        }
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.log_file()?.sync_data()
    }

    fn read_from(&mut self, offset: u64) -> io::Result<Vec<u8>> {
        let mut file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        if self.len()? <= len {
            return Ok(());
        }
        let file = self.log_file()?;
        file.set_len(len)?;
        file.sync_all()
    }
}
