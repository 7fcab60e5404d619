//! Write-ahead log hook consumed by the buffer pool.
//!
//! The buffer pool does not sequence log records itself; it only requires
//! that the log is durable before a dirty page reaches disk. `LogManager`
//! provides the minimal surface for that rule: `append` buffers a record and
//! hands back its LSN, `flush` makes everything appended so far durable.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::PoolResult;

/// Log sequence number. All records with LSN below `flushed_lsn` are
/// durable.
pub type Lsn = u64;

struct LogState {
    file: File,
    /// Records appended since the last flush, length-prefixed.
    buffer: Vec<u8>,
    next_lsn: Lsn,
    flushed_lsn: Lsn,
}

pub struct LogManager {
    state: Mutex<LogState>,
}

impl LogManager {
    pub fn create(path: &Path) -> PoolResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            state: Mutex::new(LogState {
                file,
                buffer: Vec::new(),
                next_lsn: 0,
                flushed_lsn: 0,
            }),
        })
    }

    /// Open an existing log file for appending.
    pub fn open(path: &Path) -> PoolResult<Self> {
        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            state: Mutex::new(LogState {
                file,
                buffer: Vec::new(),
                next_lsn: 0,
                flushed_lsn: 0,
            }),
        })
    }

    /// Append a record to the log buffer and return its LSN. The record is
    /// not durable until the next `flush`.
    pub fn append(&self, record: &[u8]) -> Lsn {
        let mut state = self.state.lock();
        let lsn = state.next_lsn;
        state.next_lsn += 1;

        let len = record.len() as u32;
        state.buffer.extend_from_slice(&len.to_le_bytes());
        state.buffer.extend_from_slice(record);

        lsn
    }

    /// Write the buffered records to the log file and sync. Durable on
    /// return.
    pub fn flush(&self) -> PoolResult<()> {
        let mut state = self.state.lock();
        if state.buffer.is_empty() {
            return Ok(());
        }

        let LogState {
            file,
            buffer,
            next_lsn,
            flushed_lsn,
        } = &mut *state;

        file.write_all(buffer)?;
        file.sync_all()?;
        buffer.clear();
        *flushed_lsn = *next_lsn;

        Ok(())
    }

    /// All records with LSN below this value are durable.
    pub fn flushed_lsn(&self) -> Lsn {
        self.state.lock().flushed_lsn
    }
}
