//! Spawn facts for objects created while a recording was running.
//!
//! When a spawn-capable object appears mid-recording, an [`InitialData`]
//! record captures where it was placed, what it was attached to and which
//! child identities it owns. During playback the nearest record (by
//! timestamp) seeds the recreated instance.
//!
//! # Record layout
//!
//! ```text
//! identity        i16
//! timestamp       f32
//! flags           i16   Position=1, Rotation=2, Scale=4, Parent=8
//! [position]      3 × f32          if Position
//! [rotation]      4 × f32 (xyzw)   if Rotation
//! [scale]         3 × f32          if Scale
//! [parent]        i16              if Parent
//! sub_count       i16
//! sub_count × i16
//! ```
//!
//! Fields equal to their default (zero position, identity rotation, unit
//! scale, no parent) are omitted.

use std::io::{Read, Write};

use glam::{Quat, Vec3};
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::codec::{
    len_to_i32, read_f32_le, read_i16_le, read_len, write_f32_le, write_i16_le, write_i32_le,
};
use crate::error::CodecError;
use crate::id::ObjectIdentity;

/// Which optional fields of an [`InitialData`] record are present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InitialDataFlags(pub i16);

impl InitialDataFlags {
    /// A position follows.
    pub const POSITION: i16 = 1;
    /// A rotation follows.
    pub const ROTATION: i16 = 2;
    /// A scale follows.
    pub const SCALE: i16 = 4;
    /// A parent identity follows.
    pub const PARENT: i16 = 8;

    const ALL: i16 = Self::POSITION | Self::ROTATION | Self::SCALE | Self::PARENT;

    /// Whether `bit` is set.
    pub fn has(self, bit: i16) -> bool {
        self.0 & bit != 0
    }

    fn set(&mut self, bit: i16, on: bool) {
        if on {
            self.0 |= bit;
        }
    }
}

/// Child identities owned by a spawned object. Usually a handful.
pub type SubIdentities = SmallVec<[ObjectIdentity; 4]>;

/// Placement of one object at the moment it was spawned.
#[derive(Clone, Debug, PartialEq)]
pub struct InitialData {
    /// The spawned object.
    pub identity: ObjectIdentity,
    /// Recording time of the spawn, in seconds.
    pub timestamp: f32,
    /// World position.
    pub position: Vec3,
    /// World rotation.
    pub rotation: Quat,
    /// Local scale.
    pub scale: Vec3,
    /// Object this one was attached to, if any.
    pub parent: Option<ObjectIdentity>,
    /// Identities of recorded children created together with the object.
    pub sub_identities: SubIdentities,
}

impl InitialData {
    /// A record at the default placement.
    pub fn new(identity: ObjectIdentity, timestamp: f32) -> Self {
        Self {
            identity,
            timestamp,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            parent: None,
            sub_identities: SubIdentities::new(),
        }
    }

    /// Builder: set the position.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Builder: set the rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Builder: set the scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Builder: set the parent.
    pub fn with_parent(mut self, parent: ObjectIdentity) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Builder: set the owned child identities.
    pub fn with_sub_identities(mut self, ids: impl IntoIterator<Item = ObjectIdentity>) -> Self {
        self.sub_identities = ids.into_iter().collect();
        self
    }

    /// Flags describing which optional fields differ from their default.
    pub fn flags(&self) -> InitialDataFlags {
        let mut flags = InitialDataFlags::default();
        flags.set(InitialDataFlags::POSITION, self.position != Vec3::ZERO);
        flags.set(InitialDataFlags::ROTATION, self.rotation != Quat::IDENTITY);
        flags.set(InitialDataFlags::SCALE, self.scale != Vec3::ONE);
        flags.set(InitialDataFlags::PARENT, self.parent.is_some());
        flags
    }

    /// Size of the encoded record in bytes.
    pub fn encoded_len(&self) -> usize {
        let flags = self.flags();
        let mut len = 2 + 4 + 2 + 2 + 2 * self.sub_identities.len();
        if flags.has(InitialDataFlags::POSITION) {
            len += 12;
        }
        if flags.has(InitialDataFlags::ROTATION) {
            len += 16;
        }
        if flags.has(InitialDataFlags::SCALE) {
            len += 12;
        }
        if flags.has(InitialDataFlags::PARENT) {
            len += 2;
        }
        len
    }

    /// Encode one record.
    pub fn encode(&self, w: &mut dyn Write) -> Result<(), CodecError> {
        let flags = self.flags();
        self.identity.encode(w)?;
        write_f32_le(w, self.timestamp)?;
        write_i16_le(w, flags.0)?;
        if flags.has(InitialDataFlags::POSITION) {
            write_vec3(w, self.position)?;
        }
        if flags.has(InitialDataFlags::ROTATION) {
            write_f32_le(w, self.rotation.x)?;
            write_f32_le(w, self.rotation.y)?;
            write_f32_le(w, self.rotation.z)?;
            write_f32_le(w, self.rotation.w)?;
        }
        if flags.has(InitialDataFlags::SCALE) {
            write_vec3(w, self.scale)?;
        }
        if let Some(parent) = self.parent {
            parent.encode(w)?;
        }
        let count = i16::try_from(self.sub_identities.len()).map_err(|_| {
            CodecError::PayloadTooLarge {
                len: self.sub_identities.len(),
                max: i16::MAX as usize,
            }
        })?;
        write_i16_le(w, count)?;
        for id in &self.sub_identities {
            id.encode(w)?;
        }
        Ok(())
    }

    /// Decode one record.
    pub fn decode(r: &mut dyn Read) -> Result<Self, CodecError> {
        let identity = ObjectIdentity::decode(r)?;
        let timestamp = read_f32_le(r)?;
        let flags = InitialDataFlags(read_i16_le(r)?);
        if flags.0 & !InitialDataFlags::ALL != 0 {
            return Err(CodecError::Malformed {
                detail: format!("unknown initial data flags {:#x}", flags.0),
            });
        }

        let mut data = InitialData::new(identity, timestamp);
        if flags.has(InitialDataFlags::POSITION) {
            data.position = read_vec3(r)?;
        }
        if flags.has(InitialDataFlags::ROTATION) {
            data.rotation = Quat::from_xyzw(
                read_f32_le(r)?,
                read_f32_le(r)?,
                read_f32_le(r)?,
                read_f32_le(r)?,
            );
        }
        if flags.has(InitialDataFlags::SCALE) {
            data.scale = read_vec3(r)?;
        }
        if flags.has(InitialDataFlags::PARENT) {
            data.parent = Some(ObjectIdentity::decode(r)?);
        }
        let count = read_i16_le(r)?;
        let count = usize::try_from(count).map_err(|_| CodecError::Malformed {
            detail: format!("negative sub-identity count {count}"),
        })?;
        for _ in 0..count {
            data.sub_identities.push(ObjectIdentity::decode(r)?);
        }
        Ok(data)
    }
}

fn write_vec3(w: &mut dyn Write, v: Vec3) -> Result<(), CodecError> {
    write_f32_le(w, v.x)?;
    write_f32_le(w, v.y)?;
    write_f32_le(w, v.z)
}

fn read_vec3(r: &mut dyn Read) -> Result<Vec3, CodecError> {
    Ok(Vec3::new(read_f32_le(r)?, read_f32_le(r)?, read_f32_le(r)?))
}

/// All spawn facts of one recording, grouped by identity.
///
/// Append-only while recording. An identity can hold several records
/// when the same object was spawned more than once (pooled instances).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitialDataBuffer {
    records: IndexMap<ObjectIdentity, Vec<InitialData>>,
}

impl InitialDataBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn record(&mut self, data: InitialData) {
        self.records.entry(data.identity).or_default().push(data);
    }

    /// The record of `identity` whose timestamp is closest to `timestamp`.
    ///
    /// On equal distance the earlier-recorded one wins.
    pub fn nearest(&self, identity: ObjectIdentity, timestamp: f32) -> Option<&InitialData> {
        let mut best: Option<(&InitialData, f32)> = None;
        for data in self.records.get(&identity)? {
            let delta = (data.timestamp - timestamp).abs();
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((data, delta));
            }
        }
        best.map(|(data, _)| data)
    }

    /// Every record of `identity`, in recording order.
    pub fn records(&self, identity: ObjectIdentity) -> &[InitialData] {
        self.records.get(&identity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any record exists for `identity`.
    pub fn contains(&self, identity: ObjectIdentity) -> bool {
        self.records.contains_key(&identity)
    }

    /// Number of distinct identities.
    pub fn identity_count(&self) -> usize {
        self.records.len()
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Shift every record's timestamp by `delta` seconds.
    pub fn correct_timestamps(&mut self, delta: f32) {
        for data in self.records.values_mut().flatten() {
            data.timestamp += delta;
        }
    }

    /// Size of the encoded buffer in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self
            .records
            .values()
            .map(|list| 2 + 4 + list.iter().map(InitialData::encoded_len).sum::<usize>())
            .sum::<usize>()
    }

    /// Encode as `identity_count i32` then, per identity,
    /// `identity i16, record_count i32, records`.
    pub fn encode(&self, w: &mut dyn Write) -> Result<(), CodecError> {
        write_i32_le(w, len_to_i32(self.records.len())?)?;
        for (identity, list) in &self.records {
            identity.encode(w)?;
            write_i32_le(w, len_to_i32(list.len())?)?;
            for data in list {
                data.encode(w)?;
            }
        }
        Ok(())
    }

    /// Decode a buffer written by [`encode`](Self::encode).
    pub fn decode(r: &mut dyn Read) -> Result<Self, CodecError> {
        let identities = read_len(r, "initial data identity count")?;
        let mut buffer = InitialDataBuffer::new();
        for _ in 0..identities {
            let identity = ObjectIdentity::decode(r)?;
            let count = read_len(r, "initial data record count")?;
            for _ in 0..count {
                let data = InitialData::decode(r)?;
                if data.identity != identity {
                    return Err(CodecError::Malformed {
                        detail: format!(
                            "initial data record for {} filed under {identity}",
                            data.identity
                        ),
                    });
                }
                buffer.record(data);
            }
        }
        Ok(buffer)
    }
}
