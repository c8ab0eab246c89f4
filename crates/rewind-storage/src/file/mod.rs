//! Chunked replay files with a background I/O worker.
//!
//! While recording, snapshots collect in a working chunk on the caller's
//! thread. A full chunk is handed to the worker and written at the end
//! of the data region without blocking. Commit flushes the last partial
//! chunk, appends the chunk table and spawn facts, and rewrites the
//! header with their offsets.
//!
//! While reading, the chunk holding the requested time is served from a
//! small cache. After each restore the next chunk in the direction of
//! travel is fetched in the background, and chunks left behind are
//! evicted.

mod chunk;
mod format;
mod queue;
mod worker;

pub use chunk::Chunk;
pub use format::{ChunkTable, ChunkTableEntry, FileHeader, FILE_MAGIC};

use std::fmt;
use std::mem;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rewind_core::{InitialDataBuffer, Snapshot};
use tracing::{debug, trace, warn};

use crate::config::FileTargetConfig;
use crate::error::StorageError;
use crate::target::{StorageTarget, TargetTask};
use queue::{Priority, TaskQueue};
use worker::{lock_context, spawn_worker, FileContext, FileTask, Job, TaskOutcome, WorkerHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    Writing,
    Reading,
}

/// Direction of the last seek, used to pick the read-ahead chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Time span of a chunk handed to the worker during this recording.
#[derive(Clone, Copy, Debug)]
struct ChunkSpan {
    id: u32,
    start: f32,
    end: f32,
}

/// A [`StorageTarget`] backed by a chunked replay file.
///
/// Owns one worker thread for its whole lifetime. Dropping the target
/// lets queued writes finish (up to
/// [`shutdown_timeout`](FileTargetConfig::shutdown_timeout)) and joins
/// the worker.
pub struct FileTarget {
    config: FileTargetConfig,
    mode: Mode,
    queue: Arc<TaskQueue<Job>>,
    context: Arc<Mutex<FileContext>>,
    worker: WorkerHandle,

    working: Chunk,
    next_chunk_id: u32,
    flushed: Vec<ChunkSpan>,
    first_timestamp: Option<f32>,
    last_timestamp: f32,

    initial_state: InitialDataBuffer,
    scene_name: String,

    active: Option<Arc<Chunk>>,
    last_offset: Option<f32>,
    direction: Direction,
}

impl FileTarget {
    /// Validate `config` and start the worker.
    ///
    /// The file itself is not touched until the first `PrepareWrite` or
    /// `PrepareRead`.
    pub fn new(config: FileTargetConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let queue = Arc::new(TaskQueue::new());
        let context = Arc::new(Mutex::new(FileContext::default()));
        let worker = spawn_worker(config.path.clone(), Arc::clone(&queue), Arc::clone(&context))?;
        debug!(path = %config.path.display(), chunk_size = config.chunk_size, "file target started");
        Ok(Self {
            config,
            mode: Mode::Idle,
            queue,
            context,
            worker,
            working: Chunk::new(0),
            next_chunk_id: 1,
            flushed: Vec::new(),
            first_timestamp: None,
            last_timestamp: 0.0,
            initial_state: InitialDataBuffer::new(),
            scene_name: String::new(),
            active: None,
            last_offset: None,
            direction: Direction::Forward,
        })
    }

    /// Replay file location.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Active configuration.
    pub fn config(&self) -> &FileTargetConfig {
        &self.config
    }

    /// A copy of the chunk table as currently known.
    ///
    /// While recording this lists only chunks the worker has written.
    pub fn chunk_table(&self) -> Vec<ChunkTableEntry> {
        lock_context(&self.context).table.entries().to_vec()
    }

    /// Ids of the chunks currently held in the read cache, oldest first.
    pub fn cached_chunk_ids(&self) -> Vec<u32> {
        lock_context(&self.context).cache.keys().copied().collect()
    }

    /// Tasks waiting for the worker.
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Whether the worker has stopped after a panic. Every call on a
    /// faulted target fails with [`StorageError::WorkerStopped`].
    pub fn is_faulted(&self) -> bool {
        lock_context(&self.context).faulted
    }

    // ── Task submission ─────────────────────────────────────────

    fn ensure_running(&self) -> Result<(), StorageError> {
        if self.worker.is_stopped() || self.queue.is_closed() || self.is_faulted() {
            return Err(StorageError::WorkerStopped);
        }
        Ok(())
    }

    /// Queue a task without waiting for it.
    fn submit(&self, task: FileTask, priority: Priority) -> Result<(), StorageError> {
        self.ensure_running()?;
        let name = task.name();
        self.queue
            .push(Job { task, reply: None }, priority)
            .map_err(|_| StorageError::WorkerStopped)?;
        trace!(task = name, ?priority, "file task queued");
        Ok(())
    }

    /// Queue a task and block until the worker reports back.
    fn run_task(&self, task: FileTask, priority: Priority) -> Result<TaskOutcome, StorageError> {
        self.ensure_running()?;
        let name = task.name();
        let (reply, outcome) = crossbeam_channel::bounded(1);
        self.queue
            .push(
                Job {
                    task,
                    reply: Some(reply),
                },
                priority,
            )
            .map_err(|_| StorageError::WorkerStopped)?;
        match self.wait(name, &outcome)? {
            TaskOutcome::Failed(e) => Err(e),
            other => Ok(other),
        }
    }

    fn wait(
        &self,
        task: &'static str,
        outcome: &Receiver<TaskOutcome>,
    ) -> Result<TaskOutcome, StorageError> {
        if let Some(timeout) = self.config.task_timeout {
            return match outcome.recv_timeout(timeout) {
                Ok(o) => Ok(o),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(task, ?timeout, "file task timed out");
                    Err(StorageError::TaskTimeout {
                        task,
                        waited: timeout,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => Err(StorageError::WorkerStopped),
            };
        }
        loop {
            match outcome.recv_timeout(self.config.poll_interval) {
                Ok(o) => return Ok(o),
                Err(RecvTimeoutError::Timeout) => {
                    if self.worker.is_stopped() {
                        return Err(StorageError::WorkerStopped);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(StorageError::WorkerStopped),
            }
        }
    }

    // ── Recording ───────────────────────────────────────────────

    fn reset_recording(&mut self) {
        self.working = Chunk::new(0);
        self.next_chunk_id = 1;
        self.flushed.clear();
        self.first_timestamp = None;
        self.last_timestamp = 0.0;
        self.initial_state.clear();
        self.active = None;
        self.last_offset = None;
        self.direction = Direction::Forward;
    }

    /// Swap in a fresh working chunk and return the full one.
    fn take_working(&mut self) -> Chunk {
        let next = Chunk::new(self.next_chunk_id);
        self.next_chunk_id += 1;
        let chunk = mem::replace(&mut self.working, next);
        self.flushed.push(ChunkSpan {
            id: chunk.id(),
            start: chunk.start(),
            end: chunk.end(),
        });
        debug!(
            chunk_id = chunk.id(),
            snapshots = chunk.len(),
            "chunk handed to writer"
        );
        chunk
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.mode != Mode::Writing {
            return Err(StorageError::NotPrepared { operation: "commit" });
        }
        if !self.working.is_empty() {
            let chunk = self.take_working();
            self.run_task(FileTask::WriteChunk(chunk), Priority::High)?;
        }
        let (time_offset, duration) = match self.first_timestamp {
            Some(first) => (-first, self.last_timestamp - first),
            None => (0.0, 0.0),
        };
        self.initial_state.correct_timestamps(time_offset);
        self.run_task(
            FileTask::Commit {
                initial_state: self.initial_state.clone(),
                duration,
                time_offset,
            },
            Priority::Normal,
        )?;
        self.mode = Mode::Idle;
        self.flushed.clear();
        self.working = Chunk::new(0);
        self.first_timestamp = None;
        self.last_timestamp = 0.0;
        debug!(duration, "file recording committed");
        Ok(())
    }

    // ── Reading ─────────────────────────────────────────────────

    /// A chunk from the cache, or from disk at `priority`.
    fn load_chunk(&self, id: u32, priority: Priority) -> Result<Arc<Chunk>, StorageError> {
        if let Some(chunk) = lock_context(&self.context).cache.get(&id).cloned() {
            return Ok(chunk);
        }
        match self.run_task(FileTask::FetchChunk { id }, priority)? {
            TaskOutcome::Chunk(chunk) => Ok(chunk),
            _ => Err(StorageError::ChunkNotFound { chunk_id: id }),
        }
    }

    fn restore_while_writing(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError> {
        let Some(first) = self.first_timestamp else {
            return Ok(None);
        };
        if offset.is_nan() || offset > self.last_timestamp - first {
            return Ok(None);
        }
        let t = first + offset;
        let at = self.flushed.partition_point(|s| s.end < t);
        let span = match self.flushed.get(at) {
            Some(span) => Some(*span),
            None if self.working.is_empty() => self.flushed.last().copied(),
            None => None,
        };
        let Some(span) = span else {
            return Ok(self.working.restore(t).or_else(|| self.working.last()));
        };
        // Chunks still queued for writing are found once the worker
        // reaches the fetch, since it runs after them.
        let chunk = self.load_chunk(span.id, Priority::Normal)?;
        self.trim_cache(span.id);
        Ok(chunk.restore(t).or_else(|| chunk.last()))
    }

    fn restore_from_file(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError> {
        let entry = {
            let ctx = lock_context(&self.context);
            let Some(first) = ctx.table.first_start() else {
                return Ok(None);
            };
            if offset.is_nan() || offset > ctx.header.duration {
                return Ok(None);
            }
            let t = first + offset;
            match ctx.table.find(t).or_else(|| ctx.table.entries().last()) {
                Some(entry) => (*entry, t),
                None => return Ok(None),
            }
        };
        let (entry, t) = entry;

        if let Some(prev) = self.last_offset {
            if offset > prev {
                self.direction = Direction::Forward;
            } else if offset < prev {
                self.direction = Direction::Backward;
            }
        }
        self.last_offset = Some(offset);

        let chunk = match &self.active {
            Some(active) if active.id() == entry.id => Arc::clone(active),
            _ => self.load_chunk(entry.id, Priority::High)?,
        };
        self.active = Some(Arc::clone(&chunk));
        let snapshot = chunk.restore(t).or_else(|| chunk.last());

        self.read_ahead(entry.id)?;
        self.evict(&chunk);
        Ok(snapshot)
    }

    /// Queue a background fetch of the next uncached chunk in the
    /// current direction.
    fn read_ahead(&self, current: u32) -> Result<(), StorageError> {
        let target = {
            let mut ctx = lock_context(&self.context);
            let Some(mut index) = ctx.table.position(current) else {
                return Ok(());
            };
            loop {
                index = match self.direction {
                    Direction::Forward => index + 1,
                    Direction::Backward => match index.checked_sub(1) {
                        Some(i) => i,
                        None => return Ok(()),
                    },
                };
                let Some(entry) = ctx.table.at(index) else {
                    return Ok(());
                };
                let id = entry.id;
                if ctx.buffered_requests.contains(&id) {
                    return Ok(());
                }
                if !ctx.cache.contains_key(&id) {
                    ctx.buffered_requests.insert(id);
                    break id;
                }
            }
        };
        trace!(chunk_id = target, direction = ?self.direction, "read-ahead queued");
        let queued = self.submit(FileTask::FetchChunkBuffered { id: target }, Priority::Normal);
        if queued.is_err() {
            lock_context(&self.context).buffered_requests.shift_remove(&target);
        }
        queued
    }

    /// Drop cached chunks behind the active one, then enforce the cache
    /// capacity.
    fn evict(&self, active: &Chunk) {
        let (start, end) = (active.start(), active.end());
        {
            let mut ctx = lock_context(&self.context);
            let before = ctx.cache.len();
            match self.direction {
                Direction::Forward => ctx.cache.retain(|_, c| c.end() >= start),
                Direction::Backward => ctx.cache.retain(|_, c| c.start() <= end),
            }
            let evicted = before - ctx.cache.len();
            if evicted > 0 {
                trace!(evicted, direction = ?self.direction, "evicted chunks behind playhead");
            }
        }
        self.trim_cache(active.id());
    }

    /// Drop the chunks farthest from `keep` until the cache fits.
    fn trim_cache(&self, keep: u32) {
        let mut ctx = lock_context(&self.context);
        while ctx.cache.len() > self.config.cache_capacity {
            let Some(far) = ctx.cache.keys().copied().max_by_key(|id| id.abs_diff(keep)) else {
                break;
            };
            ctx.cache.shift_remove(&far);
        }
    }
}

impl StorageTarget for FileTarget {
    fn prepare_target(&mut self, task: TargetTask) -> Result<(), StorageError> {
        debug!(task = task.name(), mode = ?self.mode, "file target transition");
        match task {
            TargetTask::PrepareWrite { scene_name } => {
                self.reset_recording();
                self.run_task(
                    FileTask::OpenWrite {
                        scene_name: scene_name.clone(),
                    },
                    Priority::Normal,
                )?;
                self.scene_name = scene_name;
                self.mode = Mode::Writing;
            }
            TargetTask::PrepareRead => {
                if self.mode == Mode::Writing {
                    return Err(StorageError::InvalidOperation {
                        reason: "commit or discard the recording before reading".into(),
                    });
                }
                let outcome = self.run_task(FileTask::OpenRead, Priority::High)?;
                if let TaskOutcome::Opened { initial_state } = outcome {
                    self.initial_state = initial_state;
                }
                self.scene_name = lock_context(&self.context).header.scene_name.clone();
                self.active = None;
                self.last_offset = None;
                self.direction = Direction::Forward;
                self.mode = Mode::Reading;
            }
            TargetTask::Commit => self.commit()?,
            TargetTask::Discard => {
                if self.mode == Mode::Writing {
                    self.reset_recording();
                    self.run_task(FileTask::Discard, Priority::Normal)?;
                } else {
                    self.run_task(FileTask::Discard, Priority::High)?;
                    self.initial_state.clear();
                    self.active = None;
                    self.last_offset = None;
                }
            }
        }
        Ok(())
    }

    fn record_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StorageError> {
        if self.mode != Mode::Writing {
            return Err(StorageError::NotPrepared {
                operation: "record_snapshot",
            });
        }
        let ts = snapshot.timestamp();
        match self.first_timestamp {
            None => {
                self.first_timestamp = Some(ts);
                self.last_timestamp = ts;
            }
            Some(_) => self.last_timestamp = self.last_timestamp.max(ts),
        }
        self.working.push(Arc::new(snapshot));
        if self.working.len() >= self.config.chunk_size {
            let chunk = self.take_working();
            self.submit(FileTask::WriteChunk(chunk), Priority::Normal)?;
        }
        Ok(())
    }

    fn restore_snapshot(&mut self, offset: f32) -> Result<Option<Arc<Snapshot>>, StorageError> {
        match self.mode {
            Mode::Writing => self.restore_while_writing(offset),
            Mode::Reading => self.restore_from_file(offset),
            Mode::Idle => Err(StorageError::NotPrepared {
                operation: "restore_snapshot",
            }),
        }
    }

    fn duration(&self) -> f32 {
        match (self.mode, self.first_timestamp) {
            (Mode::Writing, Some(first)) => self.last_timestamp - first,
            (Mode::Writing, None) => 0.0,
            _ => lock_context(&self.context).header.duration,
        }
    }

    fn memory_size(&self) -> usize {
        let written = lock_context(&self.context).header.memory_size as usize;
        match self.mode {
            Mode::Writing => written + self.working.encoded_len(),
            _ => written,
        }
    }

    fn initial_state_buffer(&self) -> &InitialDataBuffer {
        &self.initial_state
    }

    fn initial_state_buffer_mut(&mut self) -> &mut InitialDataBuffer {
        &mut self.initial_state
    }

    fn target_scene_name(&self) -> &str {
        &self.scene_name
    }

    fn is_recording(&self) -> bool {
        self.mode == Mode::Writing
    }
}

impl fmt::Debug for FileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTarget")
            .field("path", &self.config.path)
            .field("mode", &self.mode)
            .field("working_snapshots", &self.working.len())
            .field("pending_tasks", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Drop for FileTarget {
    fn drop(&mut self) {
        if self.mode == Mode::Writing {
            warn!(path = %self.config.path.display(), "file target dropped mid-recording; file left uncommitted");
        }
        if self.worker.shutdown(&self.queue, self.config.shutdown_timeout) {
            debug!("file target stopped");
        }
    }
}
