//! Typed field lists for objects that record plain values.
//!
//! An object describes its recorded fields once as a slice of
//! [`FieldDescriptor`]s, then encodes and decodes [`FieldValue`]s in
//! that order. Each descriptor carries the [`Interpolation`] used when
//! blending two recorded frames.

use glam::{Quat, Vec3};
use rewind_core::{CodecError, StateBuffer};

/// Value type of a recorded field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `bool`, one byte.
    Bool,
    /// `i16`.
    I16,
    /// `i32`.
    I32,
    /// `f32`.
    F32,
    /// `f32` packed into 16 bits (scale 256).
    LowPrecision,
    /// Three `f32`.
    Vec3,
    /// Four `f32`.
    Quat,
}

/// How a field moves between two recorded frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolation {
    /// Snap to the newer value.
    #[default]
    None,
    /// Straight-line blend. Integers round to nearest.
    Linear,
    /// Spherical blend for rotations. Other kinds blend linearly.
    Spherical,
}

/// One recorded field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, for diagnostics.
    pub name: &'static str,
    /// Value type.
    pub kind: FieldKind,
    /// Blend strategy.
    pub interpolation: Interpolation,
}

impl FieldDescriptor {
    /// A field that snaps between frames.
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            interpolation: Interpolation::None,
        }
    }

    /// The same field with another blend strategy.
    pub const fn interpolated(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

/// A field value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    /// See [`FieldKind::Bool`].
    Bool(bool),
    /// See [`FieldKind::I16`].
    I16(i16),
    /// See [`FieldKind::I32`].
    I32(i32),
    /// See [`FieldKind::F32`].
    F32(f32),
    /// See [`FieldKind::LowPrecision`].
    LowPrecision(f32),
    /// See [`FieldKind::Vec3`].
    Vec3(Vec3),
    /// See [`FieldKind::Quat`].
    Quat(Quat),
}

impl FieldValue {
    /// The value's type.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::I16(_) => FieldKind::I16,
            Self::I32(_) => FieldKind::I32,
            Self::F32(_) => FieldKind::F32,
            Self::LowPrecision(_) => FieldKind::LowPrecision,
            Self::Vec3(_) => FieldKind::Vec3,
            Self::Quat(_) => FieldKind::Quat,
        }
    }
}

fn mismatch(field: &FieldDescriptor, detail: &str) -> CodecError {
    CodecError::Malformed {
        detail: format!("field `{}`: {detail}", field.name),
    }
}

/// Append `values` to `out` in descriptor order.
///
/// # Errors
///
/// [`CodecError::Malformed`] if the counts differ or a value's kind does
/// not match its descriptor. Nothing useful is written in that case.
pub fn encode_fields(
    fields: &[FieldDescriptor],
    values: &[FieldValue],
    out: &mut StateBuffer,
) -> Result<(), CodecError> {
    if fields.len() != values.len() {
        return Err(CodecError::Malformed {
            detail: format!("{} fields but {} values", fields.len(), values.len()),
        });
    }
    for (field, value) in fields.iter().zip(values) {
        if field.kind != value.kind() {
            return Err(mismatch(field, &format!("expected {:?}, got {:?}", field.kind, value.kind())));
        }
        match *value {
            FieldValue::Bool(v) => out.write_bool(v),
            FieldValue::I16(v) => out.write_i16(v),
            FieldValue::I32(v) => out.write_i32(v),
            FieldValue::F32(v) => out.write_f32(v),
            FieldValue::LowPrecision(v) => out.write_low_precision(v),
            FieldValue::Vec3(v) => out.write_vec3(v),
            FieldValue::Quat(v) => out.write_quat(v),
        }
    }
    Ok(())
}

/// Read one value per descriptor from the cursor of `buf`.
pub fn decode_fields(
    fields: &[FieldDescriptor],
    buf: &mut StateBuffer,
) -> Result<Vec<FieldValue>, CodecError> {
    fields
        .iter()
        .map(|field| {
            Ok(match field.kind {
                FieldKind::Bool => FieldValue::Bool(buf.read_bool()?),
                FieldKind::I16 => FieldValue::I16(buf.read_i16()?),
                FieldKind::I32 => FieldValue::I32(buf.read_i32()?),
                FieldKind::F32 => FieldValue::F32(buf.read_f32()?),
                FieldKind::LowPrecision => FieldValue::LowPrecision(buf.read_low_precision()?),
                FieldKind::Vec3 => FieldValue::Vec3(buf.read_vec3()?),
                FieldKind::Quat => FieldValue::Quat(buf.read_quat()?),
            })
        })
        .collect()
}

/// Blend two frames' values at fraction `t` (clamped to `[0, 1]`).
///
/// Fields whose previous value is missing or of another kind take the
/// current value.
pub fn blend_fields(
    fields: &[FieldDescriptor],
    previous: &[FieldValue],
    current: &[FieldValue],
    t: f32,
) -> Vec<FieldValue> {
    let t = if t.is_nan() { 1.0 } else { t.clamp(0.0, 1.0) };
    current
        .iter()
        .enumerate()
        .map(|(i, &cur)| {
            let interpolation = fields.get(i).map_or(Interpolation::None, |f| f.interpolation);
            match previous.get(i) {
                Some(&prev) => blend_value(interpolation, prev, cur, t),
                None => cur,
            }
        })
        .collect()
}

fn blend_value(interpolation: Interpolation, prev: FieldValue, cur: FieldValue, t: f32) -> FieldValue {
    use FieldValue as V;
    if interpolation == Interpolation::None {
        return cur;
    }
    match (prev, cur) {
        (V::F32(a), V::F32(b)) => V::F32(lerp(a, b, t)),
        (V::LowPrecision(a), V::LowPrecision(b)) => V::LowPrecision(lerp(a, b, t)),
        (V::I16(a), V::I16(b)) => V::I16(lerp(f32::from(a), f32::from(b), t).round() as i16),
        (V::I32(a), V::I32(b)) => V::I32(lerp(a as f32, b as f32, t).round() as i32),
        (V::Vec3(a), V::Vec3(b)) => V::Vec3(a.lerp(b, t)),
        (V::Quat(a), V::Quat(b)) => match interpolation {
            Interpolation::Spherical => V::Quat(a.slerp(b, t)),
            _ => V::Quat(a.lerp(b, t)),
        },
        _ => cur,
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
