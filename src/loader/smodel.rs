//! `.smodel` file view
//!
//! [`SModelFile`] owns the raw file bytes and hands out typed, length-checked
//! views over each record table. Nothing is copied out of the buffer except
//! the header; every table, string and blob slice borrows from the view.
//!
//! Loading validates the whole file up front: header, section bounds, every
//! blob slice, every cross-reference between tables and every animation
//! invariant. A view that exists is a view that passed validation.

use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use thiserror::Error;

use super::records::*;

/// Error type for `.smodel` loading
#[derive(Error, Debug)]
pub enum SModelError {
    #[error("Failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is empty: {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// Malformed bytes: header, bounds, offsets, unknown enumeration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("File too small to contain SModel header ({size} < {required} bytes)")]
    TooSmall { size: u64, required: usize },

    #[error(
        "SModel header incompatible (bad magic or unsupported version): \
         magic={magic:#010x}, version={version_major}.{version_minor}"
    )]
    IncompatibleHeader {
        magic: u32,
        version_major: u16,
        version_minor: u16,
    },

    #[error("SModel header fileSizeBytes does not match actual file size (declared={declared}, actual={actual})")]
    FileSizeMismatch { declared: u32, actual: u64 },

    #[error("{section} out of file bounds. offset={offset} bytes={bytes} fileSize={file_size}")]
    SectionOutOfBounds {
        section: &'static str,
        offset: u64,
        bytes: u64,
        file_size: u64,
    },

    #[error("String table must begin with a NUL byte")]
    StringTableNotNulPrefixed,

    #[error("{what} slice out of blob bounds ({index_name}={index}, offset={offset}, size={size}, blobSize={blob_size})")]
    BlobSliceOutOfBounds {
        what: &'static str,
        index_name: &'static str,
        index: u32,
        offset: u64,
        size: u64,
        blob_size: u64,
    },

    #[error("Mesh has unknown indexType {index_type} (meshIndex={mesh_index})")]
    InvalidIndexType { mesh_index: u32, index_type: u32 },

    #[error("Material has unknown alphaMode {alpha_mode} (materialIndex={material_index})")]
    InvalidAlphaMode {
        material_index: u32,
        alpha_mode: u32,
    },

    #[error("Material doubleSided must be 0 or 1, got {value} (materialIndex={material_index})")]
    InvalidDoubleSided { material_index: u32, value: u32 },

    #[error("Animation channel path is invalid: {path} (channelIndex={channel_index})")]
    InvalidChannelPath { channel_index: u32, path: u16 },

    #[error("Animation sampler interpolation is invalid: {interpolation} (samplerIndex={sampler_index})")]
    InvalidInterpolation {
        sampler_index: u32,
        interpolation: u8,
    },

    #[error("Animation sampler valueType is invalid: {value_type} (samplerIndex={sampler_index})")]
    InvalidValueType { sampler_index: u32, value_type: u8 },
}

/// Well-formed ranges whose cross-references disagree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("Mesh has invalid vertexCount/vertexStride (meshIndex={mesh_index})")]
    MeshVertexLayout { mesh_index: u32 },

    #[error("Mesh vertexDataSize mismatch (meshIndex={mesh_index}, expected={expected}, actual={actual})")]
    MeshVertexSizeMismatch {
        mesh_index: u32,
        expected: u64,
        actual: u64,
    },

    #[error("Mesh indexDataSize too small for indexCount (meshIndex={mesh_index}, required={required}, actual={actual})")]
    MeshIndexSizeMismatch {
        mesh_index: u32,
        required: u64,
        actual: u64,
    },

    #[error("Primitive references invalid meshIndex (primitiveIndex={primitive_index}, meshIndex={mesh_index})")]
    PrimitiveMesh {
        primitive_index: u32,
        mesh_index: u32,
    },

    #[error("Primitive references invalid materialIndex (primitiveIndex={primitive_index}, materialIndex={material_index})")]
    PrimitiveMaterial {
        primitive_index: u32,
        material_index: u32,
    },

    #[error("Material references invalid texture index (materialIndex={material_index}, field={field}, textureIndex={texture_index})")]
    MaterialTexture {
        material_index: u32,
        field: &'static str,
        texture_index: i32,
    },

    #[error("Node parentIndex out of bounds (nodeIndex={node_index}, parentIndex={parent_index})")]
    NodeParent { node_index: u32, parent_index: u32 },

    #[error("Node child index range out of bounds (nodeIndex={node_index})")]
    NodeChildRange { node_index: u32 },

    #[error("Node references invalid child node index (nodeIndex={node_index}, childIndex={child_index})")]
    NodeChildIndex { node_index: u32, child_index: u32 },

    #[error("Node child parentIndex mismatch (nodeIndex={node_index}, childIndex={child_index}, childParentIndex={child_parent})")]
    NodeChildParentMismatch {
        node_index: u32,
        child_index: u32,
        child_parent: u32,
    },

    #[error("Node primitive index range out of bounds (nodeIndex={node_index})")]
    NodePrimitiveRange { node_index: u32 },

    #[error("Node references invalid primitive index (nodeIndex={node_index}, primitiveIndex={primitive_index})")]
    NodePrimitiveIndex {
        node_index: u32,
        primitive_index: u32,
    },

    #[error("Animation clip durationSec < 0 (clipIndex={clip_index})")]
    ClipDuration { clip_index: u32 },

    #[error("Animation clip channel range out of bounds (clipIndex={clip_index})")]
    ClipChannelRange { clip_index: u32 },

    #[error("Animation channel targetNode out of bounds (channelIndex={channel_index}, targetNode={target_node})")]
    ChannelTargetNode {
        channel_index: u32,
        target_node: u32,
    },

    #[error("Animation channel samplerIndex out of bounds (channelIndex={channel_index}, samplerIndex={sampler_index})")]
    ChannelSampler {
        channel_index: u32,
        sampler_index: u16,
    },

    #[error("Animation sampler timeCount < 1 (samplerIndex={sampler_index})")]
    SamplerTimeCount { sampler_index: u32 },

    #[error("Animation sampler time range out of bounds (samplerIndex={sampler_index})")]
    SamplerTimeRange { sampler_index: u32 },

    #[error("Animation sampler value range out of bounds (samplerIndex={sampler_index})")]
    SamplerValueRange { sampler_index: u32 },

    #[error("Animation sampler valueCount does not match timeCount * valueWidth (samplerIndex={sampler_index}, expected={expected}, actual={actual})")]
    SamplerValueCount {
        sampler_index: u32,
        expected: u64,
        actual: u32,
    },

    #[error("Animation sampler times are not non-decreasing (samplerIndex={sampler_index}, key={key})")]
    SamplerTimesNotMonotonic { sampler_index: u32, key: u32 },
}

/// Owned copy of the header, with the sections a version lacks zeroed
#[derive(Debug, Clone, Copy)]
pub struct SModelHeader {
    pub base: SModelHeaderV1,
    pub nodes: SModelHeaderV2Ext,
    pub animation: SModelHeaderV3Ext,
}

impl SModelHeader {
    pub fn version(&self) -> (u16, u16) {
        (self.base.version_major, self.base.version_minor)
    }

    /// On-disk size of this header
    pub fn size(&self) -> usize {
        header_size_for(self.base.version_major)
    }

    pub fn is_compatible(&self) -> bool {
        let magic = self.base.magic;
        let major = self.base.version_major;
        magic == SMOD_MAGIC && (MIN_VERSION_MAJOR..=MAX_VERSION_MAJOR).contains(&major)
    }
}

/// A little-endian 4-byte scalar stored in a table
pub trait LeScalar: Copy {
    fn from_le_bytes(bytes: [u8; 4]) -> Self;
}

impl LeScalar for u32 {
    fn from_le_bytes(bytes: [u8; 4]) -> Self {
        u32::from_le_bytes(bytes)
    }
}

impl LeScalar for f32 {
    fn from_le_bytes(bytes: [u8; 4]) -> Self {
        f32::from_le_bytes(bytes)
    }
}

/// Borrowed table of u32/f32 values, read in place without alignment demands
#[derive(Clone, Copy)]
pub struct ScalarTable<'a, T> {
    bytes: &'a [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: LeScalar> ScalarTable<'a, T> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        let start = index.checked_mul(4)?;
        let chunk = self.bytes.get(start..start.checked_add(4)?)?;
        Some(T::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }

    /// Sub-table `[first, first + count)`, `None` when it does not fit
    pub fn slice(&self, first: u32, count: u32) -> Option<ScalarTable<'a, T>> {
        let start = (first as usize).checked_mul(4)?;
        let end = start.checked_add((count as usize).checked_mul(4)?)?;
        self.bytes.get(start..end).map(ScalarTable::new)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + 'a {
        self.bytes
            .chunks_exact(4)
            .map(|c| T::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: LeScalar + std::fmt::Debug> std::fmt::Debug for ScalarTable<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Absolute byte ranges of every section, resolved once during load
#[derive(Debug, Clone, Default)]
struct Sections {
    meshes: Range<usize>,
    primitives: Range<usize>,
    materials: Range<usize>,
    textures: Range<usize>,
    nodes: Range<usize>,
    node_primitive_indices: Range<usize>,
    node_child_indices: Range<usize>,
    anim_clips: Range<usize>,
    anim_channels: Range<usize>,
    anim_samplers: Range<usize>,
    anim_times: Range<usize>,
    anim_values: Range<usize>,
    string_table: Range<usize>,
    blob: Range<usize>,
}

/// `[offset, offset + bytes)` if it fits in `limit`; overflow-safe
fn range_within(offset: u64, bytes: u64, limit: u64) -> Option<Range<usize>> {
    let end = offset.checked_add(bytes)?;
    if end > limit {
        return None;
    }
    Some(offset as usize..end as usize)
}

fn section_range(
    section: &'static str,
    offset: u64,
    bytes: u64,
    file_size: u64,
) -> Result<Range<usize>, FormatError> {
    range_within(offset, bytes, file_size).ok_or(FormatError::SectionOutOfBounds {
        section,
        offset,
        bytes,
        file_size,
    })
}

fn table_range<T>(
    section: &'static str,
    offset: u64,
    count: u32,
    file_size: u64,
) -> Result<Range<usize>, FormatError> {
    // u32 count * record size cannot overflow u64
    let bytes = u64::from(count) * std::mem::size_of::<T>() as u64;
    section_range(section, offset, bytes, file_size)
}

/// Optional V2/V3 tables are only bounds-checked when non-empty
fn optional_table_range<T>(
    section: &'static str,
    offset: u64,
    count: u32,
    file_size: u64,
) -> Result<Range<usize>, FormatError> {
    if count == 0 {
        return Ok(0..0);
    }
    table_range::<T>(section, offset, count, file_size)
}

/// Validated, read-only view over a cooked `.smodel` file
pub struct SModelFile {
    bytes: Vec<u8>,
    header: SModelHeader,
    sections: Sections,
}

impl std::fmt::Debug for SModelFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SModelFile")
            .field("version", &self.header.version())
            .field("size", &self.bytes.len())
            .field("meshes", &self.mesh_count())
            .field("primitives", &self.primitive_count())
            .field("materials", &self.material_count())
            .field("textures", &self.texture_count())
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl SModelFile {
    /// Read and validate a file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SModelError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| SModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(SModelError::Empty(path.to_path_buf()));
        }
        Self::from_bytes(bytes)
    }

    /// Validate an in-memory file, taking ownership of its bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SModelError> {
        let file_size = bytes.len() as u64;
        let header = Self::read_header(&bytes)?;

        let declared = header.base.file_size_bytes;
        if declared != 0 && u64::from(declared) != file_size {
            return Err(FormatError::FileSizeMismatch {
                declared,
                actual: file_size,
            }
            .into());
        }

        Self::warn_reserved(&header);

        let sections = Self::resolve_sections(&header, file_size)?;
        let file = Self {
            bytes,
            header,
            sections,
        };
        file.validate()?;

        let (major, minor) = file.header.version();
        log::debug!(
            "SModel v{}.{} validated: {} meshes, {} primitives, {} materials, {} textures, {} nodes, {} clips",
            major,
            minor,
            file.mesh_count(),
            file.primitive_count(),
            file.material_count(),
            file.texture_count(),
            file.node_count(),
            file.animation_clips().len()
        );

        Ok(file)
    }

    fn read_header(bytes: &[u8]) -> Result<SModelHeader, FormatError> {
        let size = bytes.len() as u64;
        if bytes.len() < HEADER_V1_SIZE {
            return Err(FormatError::TooSmall {
                size,
                required: HEADER_V1_SIZE,
            });
        }

        let base: SModelHeaderV1 = bytemuck::pod_read_unaligned(&bytes[..HEADER_V1_SIZE]);
        let mut header = SModelHeader {
            base,
            nodes: SModelHeaderV2Ext::default(),
            animation: SModelHeaderV3Ext::default(),
        };

        if !header.is_compatible() {
            return Err(FormatError::IncompatibleHeader {
                magic: base.magic,
                version_major: base.version_major,
                version_minor: base.version_minor,
            });
        }

        let required = header.size();
        if bytes.len() < required {
            return Err(FormatError::TooSmall { size, required });
        }

        if base.version_major >= 2 {
            header.nodes = bytemuck::pod_read_unaligned(&bytes[HEADER_V1_SIZE..HEADER_V2_SIZE]);
        }
        if base.version_major >= 3 {
            header.animation =
                bytemuck::pod_read_unaligned(&bytes[HEADER_V2_SIZE..HEADER_V3_SIZE]);
        }

        Ok(header)
    }

    fn warn_reserved(header: &SModelHeader) {
        let flags = header.base.flags;
        let reserved0 = header.base.reserved0;
        let reserved1 = header.base.reserved1;
        if flags != 0 || reserved0 != 0 || reserved1 != 0 {
            log::warn!(
                "SModel header has non-zero reserved fields (flags={flags:#x}, reserved0={reserved0:#x}, reserved1={reserved1:#x}); ignoring"
            );
        }
    }

    fn resolve_sections(header: &SModelHeader, file_size: u64) -> Result<Sections, FormatError> {
        let b = header.base;
        let n = header.nodes;
        let a = header.animation;

        Ok(Sections {
            string_table: section_range(
                "String table",
                b.string_table_offset,
                b.string_table_size,
                file_size,
            )?,
            blob: section_range("Blob section", b.blob_offset, b.blob_size, file_size)?,

            meshes: table_range::<MeshRecord>("Mesh table", b.meshes_offset, b.mesh_count, file_size)?,
            primitives: table_range::<PrimitiveRecord>(
                "Primitive table",
                b.primitives_offset,
                b.primitive_count,
                file_size,
            )?,
            materials: table_range::<MaterialRecord>(
                "Material table",
                b.materials_offset,
                b.material_count,
                file_size,
            )?,
            textures: table_range::<TextureRecord>(
                "Texture table",
                b.textures_offset,
                b.texture_count,
                file_size,
            )?,

            nodes: optional_table_range::<NodeRecord>("Node table", n.nodes_offset, n.node_count, file_size)?,
            node_primitive_indices: optional_table_range::<u32>(
                "NodePrimitiveIndices table",
                n.node_primitive_indices_offset,
                n.node_primitive_index_count,
                file_size,
            )?,
            node_child_indices: optional_table_range::<u32>(
                "NodeChildIndices table",
                n.node_child_indices_offset,
                n.node_child_indices_count,
                file_size,
            )?,

            anim_clips: optional_table_range::<AnimationClipRecord>(
                "Animation clip table",
                a.anim_clips_offset,
                a.anim_clips_count,
                file_size,
            )?,
            anim_channels: optional_table_range::<AnimationChannelRecord>(
                "Animation channel table",
                a.anim_channels_offset,
                a.anim_channels_count,
                file_size,
            )?,
            anim_samplers: optional_table_range::<AnimationSamplerRecord>(
                "Animation sampler table",
                a.anim_samplers_offset,
                a.anim_samplers_count,
                file_size,
            )?,
            anim_times: optional_table_range::<f32>(
                "Animation time table",
                a.anim_times_offset,
                a.anim_times_count,
                file_size,
            )?,
            anim_values: optional_table_range::<f32>(
                "Animation value table",
                a.anim_values_offset,
                a.anim_values_count,
                file_size,
            )?,
        })
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn validate(&self) -> Result<(), SModelError> {
        if self.string_table().first().is_some_and(|&b| b != 0) {
            return Err(FormatError::StringTableNotNulPrefixed.into());
        }

        self.validate_meshes()?;
        self.validate_textures()?;
        self.validate_primitives()?;
        self.validate_materials()?;
        self.validate_nodes()?;
        self.validate_animations()?;
        Ok(())
    }

    fn check_blob_slice(
        &self,
        what: &'static str,
        index_name: &'static str,
        index: u32,
        offset: u64,
        size: u64,
    ) -> Result<(), FormatError> {
        let blob_size = self.sections.blob.len() as u64;
        if range_within(offset, size, blob_size).is_none() {
            return Err(FormatError::BlobSliceOutOfBounds {
                what,
                index_name,
                index,
                offset,
                size,
                blob_size,
            });
        }
        Ok(())
    }

    fn validate_meshes(&self) -> Result<(), SModelError> {
        for (i, m) in self.meshes().iter().enumerate() {
            let mesh_index = i as u32;
            let vertex_count = m.vertex_count;
            let vertex_stride = m.vertex_stride;
            let vertex_size = m.vertex_data_size;
            let index_size = m.index_data_size;
            let index_type = m.index_type;

            self.check_blob_slice(
                "Mesh vertex data",
                "meshIndex",
                mesh_index,
                m.vertex_data_offset,
                vertex_size,
            )?;
            self.check_blob_slice(
                "Mesh index data",
                "meshIndex",
                mesh_index,
                m.index_data_offset,
                index_size,
            )?;

            if vertex_count == 0 || vertex_stride == 0 {
                return Err(ConsistencyError::MeshVertexLayout { mesh_index }.into());
            }

            let expected = u64::from(vertex_count) * u64::from(vertex_stride);
            if vertex_size != expected {
                return Err(ConsistencyError::MeshVertexSizeMismatch {
                    mesh_index,
                    expected,
                    actual: vertex_size,
                }
                .into());
            }

            let format = IndexFormat::from_raw(index_type).ok_or(FormatError::InvalidIndexType {
                mesh_index,
                index_type,
            })?;
            let required = u64::from(m.index_count) * format.size_bytes();
            if index_size < required {
                return Err(ConsistencyError::MeshIndexSizeMismatch {
                    mesh_index,
                    required,
                    actual: index_size,
                }
                .into());
            }
        }
        Ok(())
    }

    fn validate_textures(&self) -> Result<(), SModelError> {
        for (i, t) in self.textures().iter().enumerate() {
            self.check_blob_slice(
                "Texture image data",
                "textureIndex",
                i as u32,
                t.image_data_offset,
                t.image_data_size,
            )?;
        }
        Ok(())
    }

    fn validate_primitives(&self) -> Result<(), SModelError> {
        let mesh_count = self.mesh_count() as u32;
        let material_count = self.material_count() as u32;

        for (i, p) in self.primitives().iter().enumerate() {
            let primitive_index = i as u32;
            let mesh_index = p.mesh_index;
            let material_index = p.material_index;

            if mesh_index >= mesh_count {
                return Err(ConsistencyError::PrimitiveMesh {
                    primitive_index,
                    mesh_index,
                }
                .into());
            }
            if material_index >= material_count {
                return Err(ConsistencyError::PrimitiveMaterial {
                    primitive_index,
                    material_index,
                }
                .into());
            }
            // indexCount == 0 is tolerated; callers may treat it as "whole mesh"
        }
        Ok(())
    }

    fn validate_materials(&self) -> Result<(), SModelError> {
        let texture_count = self.texture_count() as i64;

        for (i, mat) in self.materials().iter().enumerate() {
            let material_index = i as u32;

            for slot in TextureSlot::ALL {
                let texture_index = mat.texture_index_raw(slot);
                if texture_index == NO_TEXTURE {
                    continue;
                }
                if texture_index < 0 || i64::from(texture_index) >= texture_count {
                    return Err(ConsistencyError::MaterialTexture {
                        material_index,
                        field: slot.field_name(),
                        texture_index,
                    }
                    .into());
                }
            }

            let alpha_mode = mat.alpha_mode;
            if AlphaMode::from_raw(alpha_mode).is_none() {
                return Err(FormatError::InvalidAlphaMode {
                    material_index,
                    alpha_mode,
                }
                .into());
            }

            let double_sided = mat.double_sided;
            if double_sided > 1 {
                return Err(FormatError::InvalidDoubleSided {
                    material_index,
                    value: double_sided,
                }
                .into());
            }
        }
        Ok(())
    }

    fn validate_nodes(&self) -> Result<(), SModelError> {
        let nodes = self.nodes();
        let node_count = nodes.len() as u32;
        let primitive_count = self.primitive_count() as u32;
        let child_table = self.node_child_indices();
        let primitive_table = self.node_primitive_indices();

        for (i, node) in nodes.iter().enumerate() {
            let node_index = i as u32;
            let parent_index = node.parent_index;

            if parent_index != NO_INDEX && parent_index >= node_count {
                return Err(ConsistencyError::NodeParent {
                    node_index,
                    parent_index,
                }
                .into());
            }

            let first_child = node.first_child_index;
            if node.child_count > 0 {
                let children = child_table
                    .slice(first_child, node.child_count)
                    .filter(|_| first_child != NO_INDEX)
                    .ok_or(ConsistencyError::NodeChildRange { node_index })?;

                for child_index in children.iter() {
                    if child_index >= node_count {
                        return Err(ConsistencyError::NodeChildIndex {
                            node_index,
                            child_index,
                        }
                        .into());
                    }

                    let child_parent = nodes[child_index as usize].parent_index;
                    if child_parent != node_index {
                        return Err(ConsistencyError::NodeChildParentMismatch {
                            node_index,
                            child_index,
                            child_parent,
                        }
                        .into());
                    }
                }
            }

            if node.primitive_count > 0 {
                let prims = primitive_table
                    .slice(node.first_primitive_index, node.primitive_count)
                    .ok_or(ConsistencyError::NodePrimitiveRange { node_index })?;

                for primitive_index in prims.iter() {
                    if primitive_index >= primitive_count {
                        return Err(ConsistencyError::NodePrimitiveIndex {
                            node_index,
                            primitive_index,
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_animations(&self) -> Result<(), SModelError> {
        let node_count = self.node_count() as u32;
        let channels = self.animation_channels();
        let samplers = self.animation_samplers();
        let times = self.animation_times();
        let values = self.animation_values();

        for (i, clip) in self.animation_clips().iter().enumerate() {
            let clip_index = i as u32;
            let duration = clip.duration_sec;

            // also rejects NaN
            if !(duration >= 0.0) {
                return Err(ConsistencyError::ClipDuration { clip_index }.into());
            }

            let end = u64::from(clip.first_channel) + u64::from(clip.channel_count);
            if end > channels.len() as u64 {
                return Err(ConsistencyError::ClipChannelRange { clip_index }.into());
            }
        }

        for (i, chan) in channels.iter().enumerate() {
            let channel_index = i as u32;
            let target_node = chan.target_node;
            let sampler_index = chan.sampler_index;
            let path = chan.path;

            if target_node >= node_count {
                return Err(ConsistencyError::ChannelTargetNode {
                    channel_index,
                    target_node,
                }
                .into());
            }
            if usize::from(sampler_index) >= samplers.len() {
                return Err(ConsistencyError::ChannelSampler {
                    channel_index,
                    sampler_index,
                }
                .into());
            }
            if AnimationPath::from_raw(path).is_none() {
                return Err(FormatError::InvalidChannelPath {
                    channel_index,
                    path,
                }
                .into());
            }
        }

        for (i, s) in samplers.iter().enumerate() {
            let sampler_index = i as u32;
            let time_count = s.time_count;
            let value_count = s.value_count;
            let interpolation = s.interpolation;
            let value_type = s.value_type;

            if time_count < 1 {
                return Err(ConsistencyError::SamplerTimeCount { sampler_index }.into());
            }

            let sampler_times = times
                .slice(s.first_time, time_count)
                .ok_or(ConsistencyError::SamplerTimeRange { sampler_index })?;

            if values.slice(s.first_value, value_count).is_none() {
                return Err(ConsistencyError::SamplerValueRange { sampler_index }.into());
            }

            if Interpolation::from_raw(interpolation).is_none() {
                return Err(FormatError::InvalidInterpolation {
                    sampler_index,
                    interpolation,
                }
                .into());
            }

            let value_type = AnimationValueType::from_raw(value_type).ok_or(
                FormatError::InvalidValueType {
                    sampler_index,
                    value_type,
                },
            )?;

            let expected = u64::from(time_count) * value_type.width();
            if u64::from(value_count) != expected {
                return Err(ConsistencyError::SamplerValueCount {
                    sampler_index,
                    expected,
                    actual: value_count,
                }
                .into());
            }

            let mut previous = f32::NEG_INFINITY;
            for (key, t) in sampler_times.iter().enumerate() {
                if t < previous {
                    return Err(ConsistencyError::SamplerTimesNotMonotonic {
                        sampler_index,
                        key: key as u32,
                    }
                    .into());
                }
                previous = t;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    fn table<T: Pod>(&self, range: &Range<usize>) -> &[T] {
        bytemuck::cast_slice(&self.bytes[range.clone()])
    }

    pub fn header(&self) -> &SModelHeader {
        &self.header
    }

    /// The whole file, unchanged
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes().len()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives().len()
    }

    pub fn material_count(&self) -> usize {
        self.materials().len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures().len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    pub fn meshes(&self) -> &[MeshRecord] {
        self.table(&self.sections.meshes)
    }

    pub fn primitives(&self) -> &[PrimitiveRecord] {
        self.table(&self.sections.primitives)
    }

    pub fn materials(&self) -> &[MaterialRecord] {
        self.table(&self.sections.materials)
    }

    pub fn textures(&self) -> &[TextureRecord] {
        self.table(&self.sections.textures)
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        self.table(&self.sections.nodes)
    }

    pub fn node_primitive_indices(&self) -> ScalarTable<'_, u32> {
        ScalarTable::new(&self.bytes[self.sections.node_primitive_indices.clone()])
    }

    pub fn node_child_indices(&self) -> ScalarTable<'_, u32> {
        ScalarTable::new(&self.bytes[self.sections.node_child_indices.clone()])
    }

    pub fn animation_clips(&self) -> &[AnimationClipRecord] {
        self.table(&self.sections.anim_clips)
    }

    pub fn animation_channels(&self) -> &[AnimationChannelRecord] {
        self.table(&self.sections.anim_channels)
    }

    pub fn animation_samplers(&self) -> &[AnimationSamplerRecord] {
        self.table(&self.sections.anim_samplers)
    }

    pub fn animation_times(&self) -> ScalarTable<'_, f32> {
        ScalarTable::new(&self.bytes[self.sections.anim_times.clone()])
    }

    pub fn animation_values(&self) -> ScalarTable<'_, f32> {
        ScalarTable::new(&self.bytes[self.sections.anim_values.clone()])
    }

    pub fn string_table(&self) -> &[u8] {
        &self.bytes[self.sections.string_table.clone()]
    }

    pub fn blob(&self) -> &[u8] {
        &self.bytes[self.sections.blob.clone()]
    }

    /// NUL-terminated string at `offset` in the string table.
    ///
    /// Offset 0, offsets past the table, unterminated strings and invalid
    /// UTF-8 all read as the empty string.
    pub fn string(&self, offset: u32) -> &str {
        let table = self.string_table();
        let start = offset as usize;
        if offset == 0 || start >= table.len() {
            return "";
        }

        let rest = &table[start..];
        match rest.iter().position(|&b| b == 0) {
            Some(len) => std::str::from_utf8(&rest[..len]).unwrap_or(""),
            None => "",
        }
    }

    /// Blob-relative byte slice
    pub fn blob_slice(&self, offset: u64, size: u64) -> Option<&[u8]> {
        let blob = self.blob();
        let range = range_within(offset, size, blob.len() as u64)?;
        Some(&blob[range])
    }

    pub fn mesh_vertex_bytes(&self, mesh_index: usize) -> Option<&[u8]> {
        let m = self.meshes().get(mesh_index)?;
        self.blob_slice(m.vertex_data_offset, m.vertex_data_size)
    }

    /// Exactly `indexCount` indices worth of bytes
    pub fn mesh_index_bytes(&self, mesh_index: usize) -> Option<&[u8]> {
        let m = self.meshes().get(mesh_index)?;
        let format = IndexFormat::from_raw(m.index_type)?;
        self.blob_slice(m.index_data_offset, u64::from(m.index_count) * format.size_bytes())
    }

    pub fn texture_image_bytes(&self, texture_index: usize) -> Option<&[u8]> {
        let t = self.textures().get(texture_index)?;
        self.blob_slice(t.image_data_offset, t.image_data_size)
    }

    /// Child node indices of `node_index`
    pub fn node_children(&self, node_index: usize) -> ScalarTable<'_, u32> {
        self.nodes()
            .get(node_index)
            .filter(|n| n.child_count > 0)
            .and_then(|n| {
                self.node_child_indices()
                    .slice(n.first_child_index, n.child_count)
            })
            .unwrap_or_else(|| ScalarTable::new(&[]))
    }

    /// Primitive indices drawn by `node_index`
    pub fn node_primitives(&self, node_index: usize) -> ScalarTable<'_, u32> {
        self.nodes()
            .get(node_index)
            .filter(|n| n.primitive_count > 0)
            .and_then(|n| {
                self.node_primitive_indices()
                    .slice(n.first_primitive_index, n.primitive_count)
            })
            .unwrap_or_else(|| ScalarTable::new(&[]))
    }

    /// Indices of nodes without a parent
    pub fn root_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent().is_none())
            .map(|(i, _)| i)
    }

    pub fn clip_channels(&self, clip_index: usize) -> &[AnimationChannelRecord] {
        let Some(clip) = self.animation_clips().get(clip_index) else {
            return &[];
        };
        let first = clip.first_channel as usize;
        let count = clip.channel_count as usize;
        self.animation_channels()
            .get(first..first + count)
            .unwrap_or(&[])
    }

    pub fn sampler_times(&self, sampler_index: usize) -> ScalarTable<'_, f32> {
        self.animation_samplers()
            .get(sampler_index)
            .and_then(|s| self.animation_times().slice(s.first_time, s.time_count))
            .unwrap_or_else(|| ScalarTable::new(&[]))
    }

    pub fn sampler_values(&self, sampler_index: usize) -> ScalarTable<'_, f32> {
        self.animation_samplers()
            .get(sampler_index)
            .and_then(|s| self.animation_values().slice(s.first_value, s.value_count))
            .unwrap_or_else(|| ScalarTable::new(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_only(version_major: u16) -> Vec<u8> {
        let size = header_size_for(version_major);
        let mut bytes = vec![0u8; size];
        bytes[0..4].copy_from_slice(&SMOD_MAGIC.to_le_bytes());
        bytes[4..6].copy_from_slice(&version_major.to_le_bytes());
        bytes[8..12].copy_from_slice(&(size as u32).to_le_bytes());
        bytes
    }

    #[test]
    fn test_range_within_rejects_overflow() {
        assert_eq!(range_within(4, 4, 8), Some(4..8));
        assert_eq!(range_within(8, 0, 8), Some(8..8));
        assert_eq!(range_within(8, 1, 8), None);
        assert_eq!(range_within(u64::MAX, 2, u64::MAX), None);
    }

    #[test]
    fn test_header_only_file_loads_empty() {
        for major in 1..=3 {
            let file = SModelFile::from_bytes(header_only(major)).unwrap();
            assert_eq!(file.mesh_count(), 0);
            assert_eq!(file.node_count(), 0);
            assert!(file.animation_clips().is_empty());
            assert!(file.blob().is_empty());
        }
    }

    #[test]
    fn test_too_small() {
        let err = SModelFile::from_bytes(vec![0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            SModelError::Format(FormatError::TooSmall { size: 16, .. })
        ));
    }

    #[test]
    fn test_v3_header_needs_extension_bytes() {
        let mut bytes = header_only(1);
        bytes[4..6].copy_from_slice(&3u16.to_le_bytes());
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        let err = SModelFile::from_bytes(bytes).unwrap_err();
        assert!(matches!(
            err,
            SModelError::Format(FormatError::TooSmall { required: 212, .. })
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = header_only(1);
        bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
        let err = SModelFile::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("SModel header incompatible"));
    }

    #[test]
    fn test_zero_file_size_skips_check() {
        let mut bytes = header_only(1);
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(SModelFile::from_bytes(bytes).is_ok());
    }

    #[test]
    fn test_scalar_table_reads_unaligned() {
        let mut bytes = vec![0xFFu8];
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());

        let ints: ScalarTable<'_, u32> = ScalarTable::new(&bytes[1..5]);
        assert_eq!(ints.len(), 1);
        assert_eq!(ints.get(0), Some(7));
        assert_eq!(ints.get(1), None);

        let floats: ScalarTable<'_, f32> = ScalarTable::new(&bytes[5..9]);
        assert_eq!(floats.to_vec(), vec![1.5]);
        assert!(floats.slice(0, 2).is_none());
    }
}
