//! Byte-exact record layouts of the `.smodel` (SMOD) format
//!
//! Every record is `#[repr(C, packed)]` so that tables can be reinterpreted
//! in place at any byte offset of the file buffer. Sizes are checked at
//! compile time; a mismatch means the runtime drifted from the cooker.
//!
//! Packed fields must be copied out before use (`let v = rec.field;`);
//! taking a reference to one is rejected by the compiler.

use bytemuck::{Pod, Zeroable};

#[cfg(target_endian = "big")]
compile_error!("the SMOD loader reinterprets little-endian bytes in place");

/// 'S' 'M' 'O' 'D' read as a little-endian u32
pub const SMOD_MAGIC: u32 = 0x444F_4D53;

/// Sentinel for "no parent" / "no first child" in node records
pub const NO_INDEX: u32 = u32::MAX;

/// Sentinel for "no texture bound" in material records
pub const NO_TEXTURE: i32 = -1;

/// Oldest and newest supported `versionMajor`
pub const MIN_VERSION_MAJOR: u16 = 1;
pub const MAX_VERSION_MAJOR: u16 = 3;

/// Header shared by every version (108 bytes)
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SModelHeaderV1 {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,

    pub file_size_bytes: u32,
    pub flags: u32,

    pub mesh_count: u32,
    pub primitive_count: u32,
    pub material_count: u32,
    pub texture_count: u32,

    pub reserved0: u32,

    pub meshes_offset: u64,
    pub primitives_offset: u64,
    pub materials_offset: u64,
    pub textures_offset: u64,

    pub string_table_offset: u64,
    pub blob_offset: u64,

    pub string_table_size: u64,
    pub blob_size: u64,

    pub reserved1: u64,
}

/// Node graph section, appended after the V1 header (40 bytes)
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SModelHeaderV2Ext {
    pub node_count: u32,
    pub node_primitive_index_count: u32,
    pub node_child_indices_count: u32,
    pub reserved2: u32,

    pub nodes_offset: u64,
    pub node_primitive_indices_offset: u64,
    pub node_child_indices_offset: u64,
}

/// Animation section, appended after the V2 extension (64 bytes)
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SModelHeaderV3Ext {
    pub anim_clips_count: u32,
    pub anim_channels_count: u32,
    pub anim_samplers_count: u32,
    pub anim_times_count: u32,
    pub anim_values_count: u32,
    pub reserved3: u32,

    pub anim_clips_offset: u64,
    pub anim_channels_offset: u64,
    pub anim_samplers_offset: u64,
    pub anim_times_offset: u64,
    pub anim_values_offset: u64,
}

pub const HEADER_V1_SIZE: usize = std::mem::size_of::<SModelHeaderV1>();
pub const HEADER_V2_SIZE: usize = HEADER_V1_SIZE + std::mem::size_of::<SModelHeaderV2Ext>();
pub const HEADER_V3_SIZE: usize = HEADER_V2_SIZE + std::mem::size_of::<SModelHeaderV3Ext>();

/// Size of the on-disk header for a given major version
pub fn header_size_for(version_major: u16) -> usize {
    match version_major {
        0 | 1 => HEADER_V1_SIZE,
        2 => HEADER_V2_SIZE,
        _ => HEADER_V3_SIZE,
    }
}

/// Points to raw vertex/index byte ranges inside the blob section.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MeshRecord {
    /// String table offset, 0 = no name
    pub name_str_offset: u32,

    pub vertex_stride: u32,
    pub vertex_count: u32,
    pub index_count: u32,

    pub layout_flags: u32,
    /// 0 = u16, 1 = u32
    pub index_type: u32,

    /// Blob offsets are relative to the header's `blob_offset`
    pub vertex_data_offset: u64,
    pub vertex_data_size: u64,
    pub index_data_offset: u64,
    pub index_data_size: u64,

    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
}

/// One draw call: mesh + material + index range.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct PrimitiveRecord {
    pub mesh_index: u32,
    pub material_index: u32,
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    pub reserved: [u32; 3],
}

/// glTF metallic-roughness material. Texture indices use -1 for "none".
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialRecord {
    pub name_str_offset: u32,

    pub base_color_factor: [f32; 4],
    pub emissive_factor: [f32; 3],

    pub metallic_factor: f32,
    pub roughness_factor: f32,

    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub alpha_cutoff: f32,

    pub alpha_mode: u32,
    pub double_sided: u32,

    pub base_color_texture: i32,
    pub normal_texture: i32,
    pub metallic_roughness_texture: i32,
    pub occlusion_texture: i32,
    pub emissive_texture: i32,

    pub base_color_tex_coord: u32,
    pub normal_tex_coord: u32,
    pub metallic_roughness_tex_coord: u32,
    pub occlusion_tex_coord: u32,
    pub emissive_tex_coord: u32,

    pub reserved: u32,
}

impl Default for MaterialRecord {
    fn default() -> Self {
        Self {
            name_str_offset: 0,
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            emissive_factor: [0.0, 0.0, 0.0],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            alpha_cutoff: 0.5,
            alpha_mode: 0,
            double_sided: 0,
            base_color_texture: NO_TEXTURE,
            normal_texture: NO_TEXTURE,
            metallic_roughness_texture: NO_TEXTURE,
            occlusion_texture: NO_TEXTURE,
            emissive_texture: NO_TEXTURE,
            base_color_tex_coord: 0,
            normal_tex_coord: 0,
            metallic_roughness_tex_coord: 0,
            occlusion_tex_coord: 0,
            emissive_tex_coord: 0,
            reserved: 0,
        }
    }
}

impl MaterialRecord {
    /// Raw texture index stored for `slot`
    pub fn texture_index_raw(&self, slot: TextureSlot) -> i32 {
        match slot {
            TextureSlot::BaseColor => self.base_color_texture,
            TextureSlot::Normal => self.normal_texture,
            TextureSlot::MetallicRoughness => self.metallic_roughness_texture,
            TextureSlot::Occlusion => self.occlusion_texture,
            TextureSlot::Emissive => self.emissive_texture,
        }
    }

    /// Texture index for `slot`, `None` when unbound
    pub fn texture_index(&self, slot: TextureSlot) -> Option<u32> {
        u32::try_from(self.texture_index_raw(slot)).ok()
    }

    /// UV set used by `slot`
    pub fn tex_coord(&self, slot: TextureSlot) -> u32 {
        match slot {
            TextureSlot::BaseColor => self.base_color_tex_coord,
            TextureSlot::Normal => self.normal_tex_coord,
            TextureSlot::MetallicRoughness => self.metallic_roughness_tex_coord,
            TextureSlot::Occlusion => self.occlusion_tex_coord,
            TextureSlot::Emissive => self.emissive_tex_coord,
        }
    }
}

/// Sampler parameters plus the embedded (PNG/JPG) image bytes.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TextureRecord {
    pub name_str_offset: u32,
    pub uri_str_offset: u32,

    pub color_space: u32,
    pub encoding: u32,

    pub wrap_u: u32,
    pub wrap_v: u32,
    pub min_filter: u32,
    pub mag_filter: u32,
    pub mip_filter: u32,

    /// 1.0 = disabled
    pub max_anisotropy: f32,

    pub image_data_offset: u64,
    pub image_data_size: u64,

    pub reserved0: u32,
    pub reserved1: u32,
}

/// Scene graph node (V2).
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct NodeRecord {
    pub name_str_offset: u32,
    /// `NO_INDEX` for roots
    pub parent_index: u32,
    /// Into the node child index table
    pub first_child_index: u32,
    pub child_count: u32,
    /// Into the node primitive index table
    pub first_primitive_index: u32,
    pub primitive_count: u32,

    pub translation: [f32; 3],
    /// Quaternion, xyzw
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            name_str_offset: 0,
            parent_index: NO_INDEX,
            first_child_index: NO_INDEX,
            child_count: 0,
            first_primitive_index: 0,
            primitive_count: 0,
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl NodeRecord {
    pub fn parent(&self) -> Option<u32> {
        let parent = self.parent_index;
        (parent != NO_INDEX).then_some(parent)
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct AnimationClipRecord {
    pub name_offset: u32,
    pub duration_sec: f32,
    pub first_channel: u32,
    pub channel_count: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct AnimationChannelRecord {
    pub target_node: u32,
    /// `AnimationPath`
    pub path: u16,
    pub sampler_index: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct AnimationSamplerRecord {
    /// Index into the animation time floats
    pub first_time: u32,
    pub time_count: u32,
    /// Index into the animation value floats
    pub first_value: u32,
    /// time_count * 3 (Vec3) or time_count * 4 (Quat)
    pub value_count: u32,
    pub interpolation: u8,
    pub value_type: u8,
    pub pad: u16,
}

const _: () = assert!(HEADER_V1_SIZE == 108);
const _: () = assert!(std::mem::size_of::<SModelHeaderV2Ext>() == 40);
const _: () = assert!(std::mem::size_of::<SModelHeaderV3Ext>() == 64);
const _: () = assert!(std::mem::size_of::<MeshRecord>() == 80);
const _: () = assert!(std::mem::size_of::<PrimitiveRecord>() == 32);
const _: () = assert!(std::mem::size_of::<MaterialRecord>() == 104);
const _: () = assert!(std::mem::size_of::<TextureRecord>() == 64);
const _: () = assert!(std::mem::size_of::<NodeRecord>() == 64);
const _: () = assert!(std::mem::size_of::<AnimationClipRecord>() == 16);
const _: () = assert!(std::mem::size_of::<AnimationChannelRecord>() == 8);
const _: () = assert!(std::mem::size_of::<AnimationSamplerRecord>() == 20);

/// Material texture slots, in record order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColor,
    Normal,
    MetallicRoughness,
    Occlusion,
    Emissive,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        TextureSlot::BaseColor,
        TextureSlot::Normal,
        TextureSlot::MetallicRoughness,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
    ];

    /// Color-bearing slots sample in sRGB, data slots stay linear
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureSlot::BaseColor | TextureSlot::Emissive)
    }

    pub fn field_name(self) -> &'static str {
        match self {
            TextureSlot::BaseColor => "baseColorTexture",
            TextureSlot::Normal => "normalTexture",
            TextureSlot::MetallicRoughness => "metallicRoughnessTexture",
            TextureSlot::Occlusion => "occlusionTexture",
            TextureSlot::Emissive => "emissiveTexture",
        }
    }
}

/// Mesh index width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16 = 0,
    U32 = 1,
}

impl IndexFormat {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::U16),
            1 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn size_bytes(self) -> u64 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Linear = 0,
    Srgb = 1,
}

impl ColorSpace {
    /// Anything other than 1 is treated as linear
    pub fn from_raw(raw: u32) -> Self {
        if raw == Self::Srgb as u32 {
            Self::Srgb
        } else {
            Self::Linear
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png = 0,
    Jpg = 1,
    Raw = 2,
}

impl ImageEncoding {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Png),
            1 => Some(Self::Jpg),
            2 => Some(Self::Raw),
            _ => None,
        }
    }
}

/// How to handle transparency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque = 0,
    Mask = 1,
    Blend = 2,
}

impl AlphaMode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Opaque),
            1 => Some(Self::Mask),
            2 => Some(Self::Blend),
            _ => None,
        }
    }
}

/// Node property driven by an animation channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationPath {
    Translation = 0,
    Rotation = 1,
    Scale = 2,
}

impl AnimationPath {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Translation),
            1 => Some(Self::Rotation),
            2 => Some(Self::Scale),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step = 0,
    Linear = 1,
    CubicSpline = 2,
}

impl Interpolation {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Step),
            1 => Some(Self::Linear),
            2 => Some(Self::CubicSpline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationValueType {
    Vec3 = 0,
    Quat = 1,
}

impl AnimationValueType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Vec3),
            1 => Some(Self::Quat),
            _ => None,
        }
    }

    /// Floats per keyframe
    pub fn width(self) -> u64 {
        match self {
            Self::Vec3 => 3,
            Self::Quat => 4,
        }
    }
}
