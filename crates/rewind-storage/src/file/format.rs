//! Replay file header and chunk table.
//!
//! ```text
//! [Header]        magic i32 = 0x2D42, header_size i32, memory_size i32,
//!                 data_offset i32, chunk_table_offset i32,
//!                 state_buffer_offset i32, duration f32, scene_name string
//! [Chunk data]    chunks in the order they were flushed
//! [Chunk table]   entry_count i32, then { id i32, start f32, end f32, pointer i32 }
//! [Initial state] InitialDataBuffer
//! ```
//!
//! Offsets are absolute byte positions from the start of the file. They
//! are `u64` in memory and must fit the on-disk `i32`.

use std::io::{Read, Write};

use rewind_core::codec::{
    len_to_i32, read_f32_le, read_i32_le, read_len, read_str, write_f32_le, write_i32_le,
    write_str,
};
use rewind_core::CodecError;

/// Magic number at the start of every replay file.
pub const FILE_MAGIC: i32 = 0x2D42;

/// Bytes of a chunk table entry.
const TABLE_ENTRY_BYTES: usize = 16;

pub(crate) fn write_offset(w: &mut dyn Write, v: u64) -> Result<(), CodecError> {
    let v = i32::try_from(v).map_err(|_| CodecError::PayloadTooLarge {
        len: usize::try_from(v).unwrap_or(usize::MAX),
        max: i32::MAX as usize,
    })?;
    write_i32_le(w, v)
}

pub(crate) fn read_offset(r: &mut dyn Read, what: &str) -> Result<u64, CodecError> {
    Ok(read_len(r, what)? as u64)
}

// ── FileHeader ─────────────────────────────────────────────────────

/// Fixed record at the start of a replay file.
///
/// Written with zero offsets when a recording starts and rewritten in
/// place at commit. Its size depends only on the scene name, so the
/// rewrite never moves the data region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileHeader {
    /// Bytes of chunk data.
    pub memory_size: u64,
    /// Position of the first chunk.
    pub data_offset: u64,
    /// Position of the chunk table. Zero until committed.
    pub chunk_table_offset: u64,
    /// Position of the initial state buffer. Zero until committed.
    pub state_buffer_offset: u64,
    /// Recording length in seconds.
    pub duration: f32,
    /// Scene the recording was taken in.
    pub scene_name: String,
}

impl FileHeader {
    /// A fresh header for a new recording of `scene_name`.
    pub fn new(scene_name: impl Into<String>) -> Self {
        let mut header = Self {
            scene_name: scene_name.into(),
            ..Self::default()
        };
        header.data_offset = header.encoded_len() as u64;
        header
    }

    /// Whether the chunk table and state buffer have been written.
    pub fn is_committed(&self) -> bool {
        self.chunk_table_offset != 0
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        6 * 4 + 4 + 4 + self.scene_name.len()
    }

    /// Encode the header.
    pub fn encode(&self, w: &mut dyn Write) -> Result<(), CodecError> {
        write_i32_le(w, FILE_MAGIC)?;
        write_i32_le(w, len_to_i32(self.encoded_len())?)?;
        write_offset(w, self.memory_size)?;
        write_offset(w, self.data_offset)?;
        write_offset(w, self.chunk_table_offset)?;
        write_offset(w, self.state_buffer_offset)?;
        write_f32_le(w, self.duration)?;
        write_str(w, &self.scene_name)
    }

    /// Decode and check a header.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidMagic`] if the file is not a replay file;
    /// [`CodecError::Malformed`] if the stored size disagrees with the
    /// decoded contents.
    pub fn decode(r: &mut dyn Read) -> Result<Self, CodecError> {
        let magic = read_i32_le(r)?;
        if magic != FILE_MAGIC {
            return Err(CodecError::InvalidMagic { found: magic });
        }
        let header_size = read_len(r, "header size")?;
        let header = Self {
            memory_size: read_offset(r, "memory size")?,
            data_offset: read_offset(r, "data offset")?,
            chunk_table_offset: read_offset(r, "chunk table offset")?,
            state_buffer_offset: read_offset(r, "state buffer offset")?,
            duration: read_f32_le(r)?,
            scene_name: read_str(r)?,
        };
        if header_size != header.encoded_len() {
            return Err(CodecError::Malformed {
                detail: format!(
                    "header size {header_size} does not match contents ({})",
                    header.encoded_len()
                ),
            });
        }
        Ok(header)
    }
}

// ── ChunkTable ─────────────────────────────────────────────────────

/// Seek index entry for one chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkTableEntry {
    /// Chunk id.
    pub id: u32,
    /// Timestamp of the chunk's first snapshot.
    pub start: f32,
    /// Timestamp of the chunk's last snapshot.
    pub end: f32,
    /// Absolute file position of the chunk.
    pub pointer: u64,
}

/// Chunk id → time range → file position, ordered by id.
///
/// Ids are assigned in recording order, so id order is also time order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkTable {
    entries: Vec<ChunkTableEntry>,
}

impl ChunkTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, keeping id order. An existing entry with the same
    /// id is replaced.
    pub fn insert(&mut self, entry: ChunkTableEntry) {
        match self.entries.binary_search_by_key(&entry.id, |e| e.id) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Entries in id order.
    pub fn entries(&self) -> &[ChunkTableEntry] {
        &self.entries
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entry of chunk `id`.
    pub fn get(&self, id: u32) -> Option<&ChunkTableEntry> {
        self.position(id).map(|i| &self.entries[i])
    }

    /// Index of chunk `id` in the table.
    pub fn position(&self, id: u32) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }

    /// Entry at table index `index`.
    pub fn at(&self, index: usize) -> Option<&ChunkTableEntry> {
        self.entries.get(index)
    }

    /// The chunk holding the first snapshot at or after `t`: the first
    /// chunk, in time order, whose end is at or after `t`.
    ///
    /// A `t` that falls in the gap between two chunks resolves to the
    /// later one.
    pub fn find(&self, t: f32) -> Option<&ChunkTableEntry> {
        let i = self.entries.partition_point(|e| e.end < t);
        self.entries.get(i)
    }

    /// Start time of the first chunk.
    pub fn first_start(&self) -> Option<f32> {
        self.entries.first().map(|e| e.start)
    }

    /// End time of the last chunk.
    pub fn last_end(&self) -> Option<f32> {
        self.entries.last().map(|e| e.end)
    }

    /// Shift every time range by `delta` seconds.
    pub fn rebase(&mut self, delta: f32) {
        for e in &mut self.entries {
            e.start += delta;
            e.end += delta;
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + TABLE_ENTRY_BYTES * self.entries.len()
    }

    /// Encode the table.
    pub fn encode(&self, w: &mut dyn Write) -> Result<(), CodecError> {
        write_i32_le(w, len_to_i32(self.entries.len())?)?;
        for e in &self.entries {
            write_offset(w, u64::from(e.id))?;
            write_f32_le(w, e.start)?;
            write_f32_le(w, e.end)?;
            write_offset(w, e.pointer)?;
        }
        Ok(())
    }

    /// Decode a table.
    pub fn decode(r: &mut dyn Read) -> Result<Self, CodecError> {
        let count = read_len(r, "chunk table length")?;
        let mut table = ChunkTable::new();
        for _ in 0..count {
            let id = read_len(r, "chunk id")?;
            let id = u32::try_from(id).map_err(|_| CodecError::Malformed {
                detail: format!("chunk id {id} out of range"),
            })?;
            let start = read_f32_le(r)?;
            let end = read_f32_le(r)?;
            let pointer = read_offset(r, "chunk pointer")?;
            table.insert(ChunkTableEntry {
                id,
                start,
                end,
                pointer,
            });
        }
        Ok(table)
    }
}
