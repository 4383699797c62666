//! GPU abstraction layer for backend-agnostic asset uploads
//!
//! This module provides the [`GpuDevice`] trait the asset system records its
//! transfer work against, the descriptors it passes across that seam, and the
//! scoped [`UploadContext`] that batches commands into a single submission.

pub mod mock;
pub mod upload;
#[cfg(feature = "gpu-vulkan")]
pub mod vulkan;

use std::fmt::Debug;
use thiserror::Error;

pub use upload::UploadContext;

/// Error type for GPU operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Buffer upload failed: {0}")]
    UploadFailed(String),

    #[error("Texture creation failed: {0}")]
    TextureCreationFailed(String),

    #[error("Image view creation failed: {0}")]
    ImageViewFailed(String),

    #[error("Sampler creation failed: {0}")]
    SamplerFailed(String),

    #[error("Command pool creation failed: {0}")]
    CommandPoolFailed(String),

    #[error("Queue submission failed: {0}")]
    SubmitFailed(String),

    #[error("Format {0:?} does not support linear blits for mipmap generation")]
    MipmapUnsupported(GpuTextureFormat),

    #[error("Invalid buffer size: {0}")]
    InvalidSize(usize),

    #[error("Device lost")]
    DeviceLost,

    #[error("Out of memory")]
    OutOfMemory,
}

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex buffer, filled by a transfer
    Vertex,
    /// Index buffer, filled by a transfer
    Index,
    /// Host-visible source of a transfer
    Staging,
}

/// Texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuTextureFormat {
    /// RGBA 8-bit with sRGB color space
    Rgba8Srgb,
    /// RGBA 8-bit unorm
    Rgba8Unorm,
}

impl GpuTextureFormat {
    pub fn rgba8(srgb: bool) -> Self {
        if srgb {
            Self::Rgba8Srgb
        } else {
            Self::Rgba8Unorm
        }
    }

    pub fn is_srgb(self) -> bool {
        self == Self::Rgba8Srgb
    }

    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

/// Image layouts the upload path moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    TransferSrc,
    ShaderReadOnly,
}

/// Sampler address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl WrapMode {
    /// Unknown values fall back to `Repeat`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::ClampToEdge,
            2 => Self::MirroredRepeat,
            _ => Self::Repeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

impl FilterMode {
    /// Unknown values fall back to `Nearest`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Linear,
            _ => Self::Nearest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipmapMode {
    #[default]
    Nearest,
    Linear,
}

impl MipmapMode {
    /// 0 ("none") and 1 both sample the nearest level
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            2 => Self::Linear,
            _ => Self::Nearest,
        }
    }
}

/// Texture descriptor for creation
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texture format
    pub format: GpuTextureFormat,
    /// Number of mip levels (1 = no mipmaps)
    pub mip_levels: u32,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            format: GpuTextureFormat::Rgba8Srgb,
            mip_levels: 1,
        }
    }
}

/// Sampler state for a texture
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_mode: MipmapMode,
    /// Values <= 1.0 disable anisotropic filtering
    pub max_anisotropy: f32,
    pub max_lod: f32,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_mode: MipmapMode::Linear,
            max_anisotropy: 1.0,
            max_lod: 0.0,
        }
    }
}

impl SamplerDescriptor {
    pub fn anisotropy_enabled(&self) -> bool {
        self.max_anisotropy > 1.0
    }
}

/// Core GPU device trait for backend-agnostic operations
///
/// The asset system never submits work directly: it opens an
/// [`UploadContext`], records transfers through the `cmd_*` methods, and
/// lets the context submit once. Resource creation (`create_*`) is
/// immediate and does not depend on submission order.
///
/// # Associated Types
/// - `Buffer` / `Image`: owned GPU allocations, released with `destroy_*`
/// - `ImageView` / `Sampler`: plain handles
/// - `CommandPool` / `CommandBuffer`: transient recording objects
///
/// # Example
/// ```ignore
/// let gpu = MockGpu::new();
/// let mut ctx = UploadContext::begin(&gpu)?;
/// let dst = ctx.upload_buffer(&vertex_bytes, BufferUsage::Vertex)?;
/// ctx.end_submit_and_wait()?;
/// ```
pub trait GpuDevice: Send + Sync + Clone + Debug {
    /// Buffer type for this GPU backend
    type Buffer: Send + Sync + Debug;

    /// Image type for this GPU backend (image + its memory)
    type Image: Send + Sync + Debug;

    type ImageView: Copy + Send + Sync + Debug;
    type Sampler: Copy + Send + Sync + Debug;
    type CommandPool: Copy + Send + Sync + Debug;
    type CommandBuffer: Copy + Send + Sync + Debug;

    /// Create a transient command pool on the graphics queue family
    fn create_command_pool(&self) -> GpuResult<Self::CommandPool>;

    /// Destroy a pool and every command buffer allocated from it
    fn destroy_command_pool(&self, pool: Self::CommandPool);

    /// Allocate a primary command buffer from `pool` and begin recording
    fn begin_command_buffer(&self, pool: Self::CommandPool) -> GpuResult<Self::CommandBuffer>;

    /// End recording, submit to the graphics queue and block until idle
    fn submit_and_wait(&self, cmd: Self::CommandBuffer) -> GpuResult<()>;

    /// Create a host-visible buffer holding a copy of `data`
    fn create_staging_buffer(&self, data: &[u8]) -> GpuResult<Self::Buffer>;

    /// Create a device-local buffer that can be the target of a transfer
    fn create_buffer(&self, size: u64, usage: BufferUsage) -> GpuResult<Self::Buffer>;

    fn destroy_buffer(&self, buffer: Self::Buffer);

    /// Create a sampled 2D image usable as transfer source and destination
    fn create_image(&self, desc: &TextureDescriptor) -> GpuResult<Self::Image>;

    fn destroy_image(&self, image: Self::Image);

    /// Create a view covering every mip level of `image`
    fn create_image_view(
        &self,
        image: &Self::Image,
        desc: &TextureDescriptor,
    ) -> GpuResult<Self::ImageView>;

    fn destroy_image_view(&self, view: Self::ImageView);

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuResult<Self::Sampler>;

    fn destroy_sampler(&self, sampler: Self::Sampler);

    /// Whether `format` supports linear-filtered blits (mipmap generation)
    fn supports_mipmap_blit(&self, format: GpuTextureFormat) -> bool;

    /// Record a whole-buffer copy of `size` bytes
    fn cmd_copy_buffer(
        &self,
        cmd: Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Buffer,
        size: u64,
    );

    /// Record a layout transition for mips `[base_mip, base_mip + mip_count)`
    fn cmd_transition_image_layout(
        &self,
        cmd: Self::CommandBuffer,
        image: &Self::Image,
        old: ImageLayout,
        new: ImageLayout,
        base_mip: u32,
        mip_count: u32,
    );

    /// Record a tightly packed copy into mip 0 (must be in `TransferDst`)
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: Self::CommandBuffer,
        src: &Self::Buffer,
        image: &Self::Image,
        width: u32,
        height: u32,
    );

    /// Record blits filling mips `1..mip_levels` from mip 0.
    ///
    /// Expects every level in `TransferDst`; leaves every level in
    /// `ShaderReadOnly`. Records nothing when it returns `Err`.
    fn cmd_generate_mipmaps(
        &self,
        cmd: Self::CommandBuffer,
        image: &Self::Image,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> GpuResult<()>;

    /// Get the name of this GPU backend (for debugging)
    fn backend_name(&self) -> &'static str;
}

/// Number of mip levels in a full chain: `floor(log2(max(w, h))) + 1`
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

// Re-export implementations
pub use mock::MockGpu;

#[cfg(feature = "gpu-vulkan")]
pub use vulkan::VulkanDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_debug() {
        let usage = BufferUsage::Vertex;
        assert_eq!(format!("{:?}", usage), "Vertex");
    }

    #[test]
    fn test_texture_descriptor_default() {
        let desc = TextureDescriptor::default();
        assert_eq!(desc.width, 1);
        assert_eq!(desc.height, 1);
        assert_eq!(desc.mip_levels, 1);
    }

    #[test]
    fn test_full_mip_chain() {
        assert_eq!(full_mip_chain(1, 1), 1);
        assert_eq!(full_mip_chain(2, 1), 2);
        assert_eq!(full_mip_chain(256, 256), 9);
        assert_eq!(full_mip_chain(300, 17), 9);
        assert_eq!(full_mip_chain(0, 0), 1);
    }

    #[test]
    fn test_sampler_enums_fall_back() {
        assert_eq!(WrapMode::from_raw(2), WrapMode::MirroredRepeat);
        assert_eq!(WrapMode::from_raw(77), WrapMode::Repeat);
        assert_eq!(FilterMode::from_raw(1), FilterMode::Linear);
        assert_eq!(FilterMode::from_raw(5), FilterMode::Nearest);
        assert_eq!(MipmapMode::from_raw(0), MipmapMode::Nearest);
        assert_eq!(MipmapMode::from_raw(2), MipmapMode::Linear);
    }

    #[test]
    fn test_format_color_space() {
        assert_eq!(GpuTextureFormat::rgba8(true), GpuTextureFormat::Rgba8Srgb);
        assert!(!GpuTextureFormat::rgba8(false).is_srgb());
    }
}
