//! Asynchronous journal backend
//!
//! The `Journaler` owns a [`LogDevice`] and one writer thread. Appends are
//! queued and executed strictly in submission order; each batch is written
//! and synced before its acknowledgement callback runs with the durable end
//! offset. A failed batch leaves nothing behind on the device, and every
//! batch queued after it fails too: the stream never has a gap.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::device::LogDevice;
use super::errors::{JournalError, JournalResult};
use super::head::JournalHead;
use crate::observability::Logger;

/// Contiguous serialized records handed to the backend in one append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    start: u64,
    data: Vec<u8>,
    records: usize,
}

impl WriteBatch {
    /// Empty batch starting at logical offset `start`.
    pub fn new(start: u64) -> Self {
        Self {
            start,
            data: Vec::new(),
            records: 0,
        }
    }

    /// Append one serialized record.
    pub fn push_record(&mut self, serialized: &[u8]) {
        self.data.extend_from_slice(serialized);
        self.records += 1;
    }

    /// Mutable access to the buffer for in-place encoding; the caller
    /// accounts for the record with `note_record`.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Count one record encoded through `buffer_mut`.
    pub fn note_record(&mut self) {
        self.records += 1;
    }

    /// Logical offset of the first byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Logical offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    /// Serialized bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of records.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Callback receiving the durable end offset of an append, or the failure.
pub type AppendCallback = Box<dyn FnOnce(JournalResult<u64>) + Send + 'static>;

/// Journal state recovered from the backend.
#[derive(Debug, Clone)]
pub struct RecoveredJournal {
    pub head: JournalHead,
    /// Stored bytes from `head.expire_pos` to the end of the device.
    pub data: Vec<u8>,
}

/// Storage backend consumed by the journal.
pub trait JournalBackend: Send + Sync {
    /// Initialize an empty journal described by `head`.
    fn create(&self, head: &JournalHead) -> JournalResult<()>;

    /// Load the head and every stored byte from its expire position.
    fn recover(&self) -> JournalResult<RecoveredJournal>;

    /// Drop stored bytes past `end` (a torn tail found during replay).
    fn discard_tail(&self, end: u64) -> JournalResult<()>;

    /// Queue a batch. `on_ack` runs on the writer thread once the batch is
    /// durable or has failed.
    fn append(&self, batch: WriteBatch, on_ack: AppendCallback);

    /// Persist a new expire position in the background.
    fn set_expire_pos(&self, expire_pos: u64);

    /// Current head, if the journal has been created or recovered.
    fn head(&self) -> Option<JournalHead>;

    /// Finish queued work and stop the writer thread.
    fn shutdown(&self);
}

enum Job {
    Append {
        batch: WriteBatch,
        on_ack: AppendCallback,
    },
    WriteHead(JournalHead),
}

/// Threaded backend over a [`LogDevice`].
pub struct Journaler<D: LogDevice> {
    device: Arc<Mutex<D>>,
    head: Mutex<Option<JournalHead>>,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: LogDevice> Journaler<D> {
    /// Start a journaler over `device`.
    pub fn new(device: D) -> Self {
        let device = Arc::new(Mutex::new(device));
        let (sender, receiver) = mpsc::channel();
        let worker_device = Arc::clone(&device);
        let worker = thread::Builder::new()
            .name("journal-writer".to_string())
            .spawn(move || Self::run(worker_device, receiver))
            .expect("failed to spawn journal writer thread");

        Self {
            device,
            head: Mutex::new(None),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn run(device: Arc<Mutex<D>>, jobs: Receiver<Job>) {
        let mut failed = false;

        for job in jobs {
            match job {
                Job::Append { batch, on_ack } => {
                    if failed {
                        on_ack(Err(JournalError::AppendFailed {
                            offset: batch.start(),
                            source: std::io::Error::new(
                                std::io::ErrorKind::Other,
                                "an earlier append failed",
                            ),
                        }));
                        continue;
                    }

                    let result = {
                        let mut device = device.lock();
                        device
                            .append(batch.start(), batch.data())
                            .and_then(|_| device.sync())
                    };
                    match result {
                        Ok(()) => on_ack(Ok(batch.end())),
                        Err(source) => {
                            failed = true;
                            on_ack(Err(JournalError::AppendFailed {
                                offset: batch.start(),
                                source,
                            }));
                        }
                    }
                }
                Job::WriteHead(head) => {
                    if let Err(e) = device.lock().write_head(&head) {
                        Logger::error(
                            "JOURNAL_HEAD_WRITE_FAILED",
                            &[
                                ("expire_pos", &head.expire_pos.to_string()),
                                ("error", &e.to_string()),
                            ],
                        );
                    }
                }
            }
        }
    }

    /// Shared handle to the device.
    pub fn device(&self) -> Arc<Mutex<D>> {
        Arc::clone(&self.device)
    }

    fn send(&self, job: Job) -> Result<(), Job> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }
}

impl<D: LogDevice> JournalBackend for Journaler<D> {
    fn create(&self, head: &JournalHead) -> JournalResult<()> {
        self.device
            .lock()
            .reset(head)
            .map_err(|e| JournalError::io("failed to create journal", e))?;
        *self.head.lock() = Some(head.clone());
        Ok(())
    }

    fn recover(&self) -> JournalResult<RecoveredJournal> {
        let mut device = self.device.lock();
        let head = device
            .read_head()
            .map_err(|e| JournalError::io("failed to read journal head", e))?
            .ok_or_else(|| JournalError::HeadMissing("journal was never created".to_string()))?;
        let data = device
            .read_from(head.expire_pos)
            .map_err(|e| JournalError::io("failed to read journal", e))?;
        drop(device);

        *self.head.lock() = Some(head.clone());
        Ok(RecoveredJournal { head, data })
    }

    fn discard_tail(&self, end: u64) -> JournalResult<()> {
        self.device
            .lock()
            .truncate_to(end)
            .map_err(|e| JournalError::io("failed to discard torn tail", e))
    }

    fn append(&self, batch: WriteBatch, on_ack: AppendCallback) {
        if let Err(Job::Append { on_ack, .. }) = self.send(Job::Append { batch, on_ack }) {
            on_ack(Err(JournalError::Shutdown));
        }
    }

    fn set_expire_pos(&self, expire_pos: u64) {
        let next = {
            let mut head = self.head.lock();
            match head.as_mut() {
                Some(current) if current.expire_pos < expire_pos => {
                    current.expire_pos = expire_pos;
                    current.clone()
                }
                _ => return,
            }
        };
        if let Err(Job::WriteHead(head)) = self.send(Job::WriteHead(next)) {
            Logger::warn(
                "JOURNAL_HEAD_WRITE_DROPPED",
                &[("expire_pos", &head.expire_pos.to_string())],
            );
        }
    }

    fn head(&self) -> Option<JournalHead> {
        self.head.lock().clone()
    }

    fn shutdown(&self) {
        // Dropping the sender ends the worker loop once the queue drains.
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl<D: LogDevice> Drop for Journaler<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Completion, CompletionSignal, Status};
    use crate::journal::device::MemoryDevice;
    use crate::journal::record::{JournalRecord, RecordKind};
    use std::time::Duration;

    fn batch_at(start: u64, payloads: &[&[u8]]) -> WriteBatch {
        let mut batch = WriteBatch::new(start);
        for payload in payloads {
            batch.push_record(&JournalRecord::new(RecordKind::Regular, payload.to_vec()).serialize());
        }
        batch
    }

    fn ack_signal() -> (CompletionSignal, Arc<Mutex<Option<JournalResult<u64>>>>, AppendCallback) {
        let (signal, completion): (CompletionSignal, Completion) = CompletionSignal::new();
        let slot = Arc::new(Mutex::new(None));
        let target = Arc::clone(&slot);
        let callback: AppendCallback = Box::new(move |result| {
            let status = if result.is_ok() { Status::OK } else { Status::EIO };
            *target.lock() = Some(result);
            completion.complete(status);
        });
        (signal, slot, callback)
    }

    #[test]
    fn test_append_acknowledges_end_offset() {
        let device = MemoryDevice::new();
        let journaler = Journaler::new(device.clone());
        journaler.create(&JournalHead::new(0)).unwrap();

        let batch = batch_at(0, &[b"one", b"two"]);
        let end = batch.end();
        let (signal, slot, callback) = ack_signal();
        journaler.append(batch, callback);

        assert_eq!(signal.wait_for(Duration::from_secs(10)), Some(Status::OK));
        assert_eq!(slot.lock().take().unwrap().unwrap(), end);
        assert_eq!(device.synced_len(), end);
    }

    #[test]
    fn test_failure_poisons_later_appends() {
        let device = MemoryDevice::new();
        let journaler = Journaler::new(device.clone());
        journaler.create(&JournalHead::new(0)).unwrap();
        device.set_fail_appends(true);

        let first = batch_at(0, &[b"one"]);
        let second = batch_at(first.end(), &[b"two"]);
        let (signal1, _, cb1) = ack_signal();
        let (signal2, _, cb2) = ack_signal();
        journaler.append(first, cb1);
        assert_eq!(signal1.wait_for(Duration::from_secs(10)), Some(Status::EIO));

        device.set_fail_appends(false);
        journaler.append(second, cb2);
        assert_eq!(signal2.wait_for(Duration::from_secs(10)), Some(Status::EIO));
        assert!(device.contents().is_empty());
    }

    #[test]
    fn test_append_after_shutdown_fails() {
        let journaler = Journaler::new(MemoryDevice::new());
        journaler.create(&JournalHead::new(0)).unwrap();
        journaler.shutdown();

        let (signal, slot, callback) = ack_signal();
        journaler.append(batch_at(0, &[b"late"]), callback);

        assert_eq!(signal.try_status(), Some(Status::EIO));
        assert!(matches!(slot.lock().take(), Some(Err(JournalError::Shutdown))));
    }

    #[test]
    fn test_recover_requires_head() {
        let journaler = Journaler::new(MemoryDevice::new());
        assert!(matches!(journaler.recover(), Err(JournalError::HeadMissing(_))));
    }

    #[test]
    fn test_set_expire_pos_persists_head() {
        let device = MemoryDevice::new();
        let journaler = Journaler::new(device.clone());
        journaler.create(&JournalHead::new(0)).unwrap();

        journaler.set_expire_pos(128);
        journaler.set_expire_pos(64);
        journaler.shutdown();

        assert_eq!(device.head().unwrap().expire_pos, 128);
    }

    #[test]
    fn test_set_expire_pos_after_shutdown_is_dropped() {
        let device = MemoryDevice::new();
        let journaler = Journaler::new(device.clone());
        journaler.create(&JournalHead::new(0)).unwrap();
        journaler.shutdown();

        journaler.set_expire_pos(256);

        assert_eq!(journaler.head().unwrap().expire_pos, 256);
        assert_eq!(device.head().unwrap().expire_pos, 0);
    }
}
