/// Uniform data interfaces and the layouts that describe them.
///
/// A `UniformData` is a block of bytes with a dirty flag, shared between the
/// buffers that bind it and whoever else holds a handle. A
/// `UniformDataLayoutSet` maps binding points to layouts and, for a given
/// alignment, decides where each binding lives inside one instance block.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use bytemuck::Pod;
use crate::error::{Error, LayoutMismatch, Result};
use crate::utils::align_up;

// ===== UNIFORM DATA =====

/// Byte block uploaded into a uniform buffer
pub trait UniformData: Send {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Size rounded up to `alignment`
    fn padded_size(&self, alignment: u64) -> u64 {
        align_up(self.size(), alignment)
    }

    fn bytes(&self) -> &[u8];

    fn is_dirty(&self) -> bool;

    fn set_dirty(&mut self, dirty: bool);
}

/// Uniform data shared between buffers and external holders
pub type SharedUniformData = Arc<Mutex<dyn UniformData>>;

/// Per-instance data: binding point → data
pub type InstanceDataSet = BTreeMap<u32, SharedUniformData>;

/// Wrap a uniform data value into a shared handle
pub fn share<D: UniformData + 'static>(data: D) -> SharedUniformData {
    Arc::new(Mutex::new(data))
}

/// Lock a shared uniform data handle, mapping poisoning to a backend error
pub fn lock_data(data: &SharedUniformData) -> Result<MutexGuard<'_, dyn UniformData + 'static>> {
    data.lock()
        .map_err(|_| Error::BackendError("Uniform data lock poisoned".to_string()))
}

/// Untyped byte blob
#[derive(Debug, Clone)]
pub struct RawUniformData {
    bytes: Vec<u8>,
    dirty: bool,
}

impl RawUniformData {
    /// Zero-filled data of `size` bytes, dirty
    pub fn new(size: u64) -> Self {
        Self {
            bytes: vec![0; size as usize],
            dirty: true,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, dirty: true }
    }

    /// Mutable bytes; marks the data dirty
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.bytes
    }

    /// Overwrite the bytes at `offset` with a POD value
    ///
    /// # Panics
    ///
    /// Panics if `value` does not fit at `offset`.
    pub fn write<T: Pod>(&mut self, offset: usize, value: &T) {
        let src = bytemuck::bytes_of(value);
        self.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
    }
}

impl UniformData for RawUniformData {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}

/// Typed wrapper around a POD struct
#[derive(Debug, Clone)]
pub struct StructUniformData<T: Pod + Send> {
    value: T,
    dirty: bool,
}

impl<T: Pod + Send> StructUniformData<T> {
    pub fn new(value: T) -> Self {
        Self { value, dirty: true }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutable access; marks the data dirty
    pub fn get_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }
}

impl<T: Pod + Send> UniformData for StructUniformData<T> {
    fn size(&self) -> u64 {
        std::mem::size_of::<T>() as u64
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.value)
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}

// ===== FIELD TYPE =====

/// GLSL field type inside a uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Int,
    UInt,
}

impl FieldType {
    /// Size in bytes (std140 layout rules)
    pub fn size_bytes(&self) -> u64 {
        match self {
            FieldType::Float => 4,
            FieldType::Vec2  => 8,
            FieldType::Vec3  => 12,
            FieldType::Vec4  => 16,
            FieldType::Mat3  => 48, // std140: 3 × vec4 columns
            FieldType::Mat4  => 64,
            FieldType::Int   => 4,
            FieldType::UInt  => 4,
        }
    }

    /// Base alignment in bytes (std140 layout rules)
    pub fn alignment(&self) -> u64 {
        match self {
            FieldType::Float => 4,
            FieldType::Vec2  => 8,
            FieldType::Vec3  => 16,
            FieldType::Vec4  => 16,
            FieldType::Mat3  => 16,
            FieldType::Mat4  => 16,
            FieldType::Int   => 4,
            FieldType::UInt  => 4,
        }
    }
}

// ===== LAYOUT =====

/// Shape of the data bound at one binding point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDataLayout {
    size: u64,
    field_offsets: Vec<u64>,
}

impl UniformDataLayout {
    /// Opaque block of `size` bytes
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn from_size(size: u64) -> Self {
        assert!(size > 0, "uniform data layout must not be empty");
        Self {
            size,
            field_offsets: Vec::new(),
        }
    }

    /// std140 block made of `fields`, in declaration order
    ///
    /// The block size is rounded up to 16 bytes, the std140 alignment of a
    /// structure.
    pub fn from_fields(fields: &[FieldType]) -> Self {
        assert!(!fields.is_empty(), "uniform data layout must not be empty");
        let mut offset = 0;
        let mut field_offsets = Vec::with_capacity(fields.len());
        for field in fields {
            offset = align_up(offset, field.alignment());
            field_offsets.push(offset);
            offset += field.size_bytes();
        }
        Self {
            size: align_up(offset, 16),
            field_offsets,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offsets of each field for layouts built with `from_fields`
    pub fn field_offsets(&self) -> &[u64] {
        &self.field_offsets
    }

    /// Fresh zeroed data matching this layout
    pub fn create_data(&self) -> SharedUniformData {
        share(RawUniformData::new(self.size))
    }
}

// ===== LAYOUT SET =====

/// Binding point → layout, packed into one aligned instance block
///
/// Offsets grow with the binding index and each one is a multiple of the
/// alignment. They are recomputed whenever the alignment or a layout changes.
#[derive(Debug, Clone)]
pub struct UniformDataLayoutSet {
    layouts: BTreeMap<u32, UniformDataLayout>,
    offsets: BTreeMap<u32, u64>,
    alignment: u64,
    padded_size: u64,
}

impl UniformDataLayoutSet {
    pub fn new() -> Self {
        Self {
            layouts: BTreeMap::new(),
            offsets: BTreeMap::new(),
            alignment: 1,
            padded_size: 0,
        }
    }

    /// Builder form of `insert`
    pub fn with(mut self, binding: u32, layout: UniformDataLayout) -> Self {
        self.insert(binding, layout);
        self
    }

    pub fn insert(&mut self, binding: u32, layout: UniformDataLayout) {
        self.layouts.insert(binding, layout);
        self.recompute();
    }

    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    pub fn set_alignment(&mut self, alignment: u64) {
        assert!(
            alignment.is_power_of_two(),
            "alignment must be a power of two, got {}",
            alignment
        );
        self.alignment = alignment;
        self.recompute();
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Total padded size of one instance block
    pub fn padded_size(&self) -> u64 {
        self.padded_size
    }

    /// Offset of `binding` inside an instance block
    pub fn offset(&self, binding: u32) -> Option<u64> {
        self.offsets.get(&binding).copied()
    }

    pub fn layout(&self, binding: u32) -> Option<&UniformDataLayout> {
        self.layouts.get(&binding)
    }

    /// Binding points in ascending order
    pub fn bindings(&self) -> impl Iterator<Item = u32> + '_ {
        self.layouts.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &UniformDataLayout)> + '_ {
        self.layouts.iter().map(|(binding, layout)| (*binding, layout))
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Default data for every binding point
    pub fn create_default_set(&self) -> InstanceDataSet {
        self.layouts
            .iter()
            .map(|(binding, layout)| (*binding, layout.create_data()))
            .collect()
    }

    /// Check that `data` provides exactly the bound bindings with matching sizes
    pub fn validate(&self, data: &InstanceDataSet) -> Result<()> {
        if let Some(unknown) = data.keys().find(|binding| !self.layouts.contains_key(binding)) {
            return Err(LayoutMismatch::UnknownBinding(*unknown).into());
        }
        for (binding, layout) in &self.layouts {
            let Some(entry) = data.get(binding) else {
                return Err(LayoutMismatch::MissingBinding(*binding).into());
            };
            let actual = lock_data(entry)?.size();
            if actual != layout.size() {
                return Err(LayoutMismatch::SizeMismatch {
                    binding: *binding,
                    expected: layout.size(),
                    actual,
                }
                .into());
            }
        }
        Ok(())
    }

    fn recompute(&mut self) {
        let mut offset = 0;
        self.offsets.clear();
        for (binding, layout) in &self.layouts {
            self.offsets.insert(*binding, offset);
            offset += align_up(layout.size(), self.alignment);
        }
        self.padded_size = offset;
    }
}

impl Default for UniformDataLayoutSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "uniform_data_tests.rs"]
mod tests;
