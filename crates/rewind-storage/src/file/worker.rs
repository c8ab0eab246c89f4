//! Background file I/O thread.
//!
//! The worker owns the file handle exclusively. Every read or write of
//! the replay file happens here, one task at a time, in the order the
//! [`TaskQueue`] hands them out. State the simulation thread also needs
//! (header, chunk table, chunk cache) lives in a [`FileContext`] behind
//! one coarse lock.
//!
//! A failing task is logged and reported to whoever waits on it; the
//! worker keeps going. A panic ends the worker for good: the context is
//! marked faulted, queued tasks are dropped (waking their waiters), and
//! every later call on the target fails with
//! [`StorageError::WorkerStopped`].

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use indexmap::{IndexMap, IndexSet};
use rewind_core::{CodecError, InitialDataBuffer};
use tracing::{debug, error, trace, warn};

use super::chunk::Chunk;
use super::format::{ChunkTable, ChunkTableEntry, FileHeader};
use super::queue::TaskQueue;
use crate::error::StorageError;

// ── Tasks ──────────────────────────────────────────────────────────

/// Work items executed by the worker.
pub(crate) enum FileTask {
    /// Create or truncate the file and write a fresh header.
    OpenWrite { scene_name: String },
    /// Append a full chunk to the data region.
    WriteChunk(Chunk),
    /// Rebase chunks if needed, append the chunk table and initial state
    /// buffer, rewrite the header, close the file.
    Commit {
        initial_state: InitialDataBuffer,
        duration: f32,
        time_offset: f32,
    },
    /// Open the file for reading and load header, table and spawn facts.
    OpenRead,
    /// Load a chunk that someone is waiting for.
    FetchChunk { id: u32 },
    /// Load a chunk speculatively into the cache.
    FetchChunkBuffered { id: u32 },
    /// Drop everything recorded so far.
    Discard,
    #[cfg(test)]
    Crash,
    #[cfg(test)]
    Stall(Duration),
}

impl FileTask {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::OpenWrite { .. } => "open_write",
            Self::WriteChunk(_) => "write_chunk",
            Self::Commit { .. } => "commit",
            Self::OpenRead => "open_read",
            Self::FetchChunk { .. } => "fetch_chunk",
            Self::FetchChunkBuffered { .. } => "fetch_chunk_buffered",
            Self::Discard => "discard",
            #[cfg(test)]
            Self::Crash => "crash",
            #[cfg(test)]
            Self::Stall(_) => "stall",
        }
    }
}

/// Result sent back to a waiting caller.
pub(crate) enum TaskOutcome {
    Done,
    Chunk(Arc<Chunk>),
    Opened { initial_state: InitialDataBuffer },
    Failed(StorageError),
}

/// A task plus the channel its result goes to, if anyone waits.
pub(crate) struct Job {
    pub(crate) task: FileTask,
    pub(crate) reply: Option<Sender<TaskOutcome>>,
}

// ── Shared context ────────────────────────────────────────────────

/// State shared between the target and its worker.
#[derive(Default)]
pub(crate) struct FileContext {
    pub(crate) header: FileHeader,
    pub(crate) table: ChunkTable,
    pub(crate) cache: IndexMap<u32, Arc<Chunk>>,
    /// Chunk ids with a read-ahead fetch queued but not yet finished.
    pub(crate) buffered_requests: IndexSet<u32>,
    pub(crate) faulted: bool,
}

// A worker that panicked mid-task leaves the context usable: every
// field is replaced wholesale by the tasks that write it.
pub(crate) fn lock_context(context: &Mutex<FileContext>) -> MutexGuard<'_, FileContext> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Thread lifecycle ──────────────────────────────────────────────

/// Owner-side handle of the worker thread.
pub(crate) struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Close the queue, let the worker drain it, and join.
    ///
    /// Returns `false` if the worker did not stop within `timeout`; the
    /// thread is then detached.
    pub(crate) fn shutdown(&mut self, queue: &TaskQueue<Job>, timeout: Duration) -> bool {
        queue.close();
        let Some(thread) = self.thread.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !self.is_stopped() {
            if Instant::now() > deadline {
                error!(
                    pending = queue.len(),
                    ?timeout,
                    "file worker did not drain before shutdown timeout; detaching"
                );
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        // Panics are caught inside the thread, so join cannot fail.
        let _ = thread.join();
        true
    }
}

/// Start the worker for the file at `path`.
pub(crate) fn spawn_worker(
    path: PathBuf,
    queue: Arc<TaskQueue<Job>>,
    context: Arc<Mutex<FileContext>>,
) -> std::io::Result<WorkerHandle> {
    let stopped = Arc::new(AtomicBool::new(false));
    let stopped_flag = Arc::clone(&stopped);
    let thread = thread::Builder::new()
        .name("rewind-file-io".into())
        .spawn(move || {
            let worker = FileWorker {
                path,
                file: None,
                writing: false,
                data_end: 0,
                queue: Arc::clone(&queue),
                context: Arc::clone(&context),
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| worker.run())) {
                error!(
                    panic = %panic_message(&*payload),
                    "file worker panicked; target is faulted"
                );
                lock_context(&context).faulted = true;
                let dropped = queue.abandon();
                if dropped > 0 {
                    warn!(dropped, "abandoned queued file tasks");
                }
            }
            stopped_flag.store(true, Ordering::Release);
        })?;
    Ok(WorkerHandle {
        thread: Some(thread),
        stopped,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Worker ─────────────────────────────────────────────────────────

struct FileWorker {
    path: PathBuf,
    file: Option<File>,
    writing: bool,
    /// First byte after the chunk data written so far.
    data_end: u64,
    queue: Arc<TaskQueue<Job>>,
    context: Arc<Mutex<FileContext>>,
}

impl FileWorker {
    fn run(mut self) {
        while let Some(job) = self.queue.pop() {
            let name = job.task.name();
            let buffered = match job.task {
                FileTask::FetchChunkBuffered { id } => Some(id),
                _ => None,
            };
            trace!(task = name, "file task started");
            let outcome = match self.execute(job.task) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(task = name, error = %e, "file task failed");
                    if let Some(id) = buffered {
                        lock_context(&self.context).buffered_requests.shift_remove(&id);
                    }
                    TaskOutcome::Failed(e)
                }
            };
            if let Some(reply) = job.reply {
                // The waiter may have timed out and dropped its receiver.
                let _ = reply.send(outcome);
            }
        }
        debug!("file worker drained");
    }

    fn execute(&mut self, task: FileTask) -> Result<TaskOutcome, StorageError> {
        match task {
            FileTask::OpenWrite { scene_name } => self.open_write(scene_name),
            FileTask::WriteChunk(chunk) => self.write_chunk(&chunk),
            FileTask::Commit {
                initial_state,
                duration,
                time_offset,
            } => self.commit(&initial_state, duration, time_offset),
            FileTask::OpenRead => self.open_read(),
            FileTask::FetchChunk { id } | FileTask::FetchChunkBuffered { id } => {
                self.fetch_chunk(id)
            }
            FileTask::Discard => self.discard(),
            #[cfg(test)]
            FileTask::Crash => panic!("injected worker failure"),
            #[cfg(test)]
            FileTask::Stall(pause) => {
                thread::sleep(pause);
                Ok(TaskOutcome::Done)
            }
        }
    }

    fn open_write(&mut self, scene_name: String) -> Result<TaskOutcome, StorageError> {
        self.file = None;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        let header = FileHeader::new(scene_name);
        write_block(&file, 0, &encode(|w| header.encode(w))?)?;
        self.data_end = header.data_offset;
        self.file = Some(file);
        self.writing = true;

        let mut ctx = lock_context(&self.context);
        ctx.header = header;
        ctx.table.clear();
        ctx.cache.clear();
        ctx.buffered_requests.clear();
        debug!(path = %self.path.display(), "replay file opened for writing");
        Ok(TaskOutcome::Done)
    }

    fn writable_file(&self, operation: &'static str) -> Result<&File, StorageError> {
        match &self.file {
            Some(file) if self.writing => Ok(file),
            _ => Err(StorageError::NotPrepared { operation }),
        }
    }

    fn write_chunk(&mut self, chunk: &Chunk) -> Result<TaskOutcome, StorageError> {
        let bytes = encode(|w| chunk.encode(w))?;
        let pointer = self.data_end;
        write_block(self.writable_file("write_chunk")?, pointer, &bytes)?;
        self.data_end += bytes.len() as u64;

        let mut ctx = lock_context(&self.context);
        ctx.table.insert(ChunkTableEntry {
            id: chunk.id(),
            start: chunk.start(),
            end: chunk.end(),
            pointer,
        });
        ctx.header.memory_size = self.data_end - ctx.header.data_offset;
        debug!(
            chunk_id = chunk.id(),
            snapshots = chunk.len(),
            bytes = bytes.len(),
            "chunk written"
        );
        Ok(TaskOutcome::Done)
    }

    fn commit(
        &mut self,
        initial_state: &InitialDataBuffer,
        duration: f32,
        time_offset: f32,
    ) -> Result<TaskOutcome, StorageError> {
        let file = self.writable_file("commit")?;
        let mut ctx = lock_context(&self.context);

        if time_offset != 0.0 {
            for entry in ctx.table.entries() {
                let (mut chunk, _, _) = read_chunk(file, entry.pointer)?;
                chunk.rebase(time_offset);
                write_block(file, entry.pointer, &encode(|w| chunk.encode(w))?)?;
            }
            ctx.table.rebase(time_offset);
        }

        let table_offset = self.data_end;
        let mut tail = encode(|w| ctx.table.encode(w))?;
        let state_offset = table_offset + tail.len() as u64;
        initial_state.encode(&mut tail)?;
        write_block(file, table_offset, &tail)?;

        ctx.header.chunk_table_offset = table_offset;
        ctx.header.state_buffer_offset = state_offset;
        ctx.header.duration = duration;
        ctx.header.memory_size = table_offset - ctx.header.data_offset;
        write_block(file, 0, &encode(|w| ctx.header.encode(w))?)?;
        file.sync_all()?;
        ctx.cache.clear();
        debug!(
            chunks = ctx.table.len(),
            duration,
            time_offset,
            bytes = state_offset + initial_state.encoded_len() as u64,
            "recording committed"
        );
        drop(ctx);

        self.file = None;
        self.writing = false;
        Ok(TaskOutcome::Done)
    }

    fn open_read(&mut self) -> Result<TaskOutcome, StorageError> {
        self.file = None;
        self.writing = false;
        let file = File::open(&self.path)?;
        let header = FileHeader::decode(&mut BufReader::new(&file))?;
        if !header.is_committed() {
            return Err(CodecError::Malformed {
                detail: "replay file was never committed".into(),
            }
            .into());
        }
        (&file).seek(SeekFrom::Start(header.chunk_table_offset))?;
        let table = ChunkTable::decode(&mut BufReader::new(&file))?;
        (&file).seek(SeekFrom::Start(header.state_buffer_offset))?;
        let initial_state = InitialDataBuffer::decode(&mut BufReader::new(&file))?;

        self.data_end = header.chunk_table_offset;
        self.file = Some(file);

        let mut ctx = lock_context(&self.context);
        debug!(
            path = %self.path.display(),
            chunks = table.len(),
            duration = header.duration,
            "replay file opened for reading"
        );
        ctx.header = header;
        ctx.table = table;
        ctx.cache.clear();
        ctx.buffered_requests.clear();
        Ok(TaskOutcome::Opened { initial_state })
    }

    fn fetch_chunk(&mut self, id: u32) -> Result<TaskOutcome, StorageError> {
        let entry = {
            let mut ctx = lock_context(&self.context);
            if let Some(chunk) = ctx.cache.get(&id).cloned() {
                ctx.buffered_requests.shift_remove(&id);
                return Ok(TaskOutcome::Chunk(chunk));
            }
            *ctx.table
                .get(id)
                .ok_or(StorageError::ChunkNotFound { chunk_id: id })?
        };
        let file = self.file.as_ref().ok_or(StorageError::NotPrepared {
            operation: "fetch_chunk",
        })?;

        let (chunk, start, end) = read_chunk(file, entry.pointer)?;
        if chunk.id() != id {
            return Err(CodecError::Malformed {
                detail: format!("chunk table entry {id} points at chunk {}", chunk.id()),
            }
            .into());
        }
        if start != entry.start || end != entry.end {
            warn!(
                chunk_id = id,
                table_start = entry.start,
                table_end = entry.end,
                start,
                end,
                "chunk header disagrees with chunk table; using chunk data"
            );
        }

        let chunk = Arc::new(chunk);
        let mut ctx = lock_context(&self.context);
        ctx.cache.insert(id, Arc::clone(&chunk));
        ctx.buffered_requests.shift_remove(&id);
        trace!(chunk_id = id, snapshots = chunk.len(), "chunk loaded");
        Ok(TaskOutcome::Chunk(chunk))
    }

    fn discard(&mut self) -> Result<TaskOutcome, StorageError> {
        let mut ctx = lock_context(&self.context);
        let recording = if self.writing { self.file.as_ref() } else { None };
        if let Some(file) = recording {
            file.set_len(0)?;
            let header = FileHeader::new(ctx.header.scene_name.clone());
            write_block(file, 0, &encode(|w| header.encode(w))?)?;
            self.data_end = header.data_offset;
            ctx.header = header;
        } else {
            self.file = None;
            ctx.header = FileHeader::default();
        }
        ctx.table.clear();
        ctx.cache.clear();
        ctx.buffered_requests.clear();
        debug!(writing = self.writing, "recording discarded");
        Ok(TaskOutcome::Done)
    }
}

// ── I/O helpers ───────────────────────────────────────────────────

fn encode(
    f: impl FnOnce(&mut dyn Write) -> Result<(), CodecError>,
) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    f(&mut bytes)?;
    Ok(bytes)
}

fn write_block(mut file: &File, pos: u64, bytes: &[u8]) -> Result<(), StorageError> {
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(bytes)?;
    Ok(())
}

fn read_chunk(mut file: &File, pos: u64) -> Result<(Chunk, f32, f32), StorageError> {
    file.seek(SeekFrom::Start(pos))?;
    Ok(Chunk::decode(&mut BufReader::new(file))?)
}
