//! Texture decoding and GPU texture assets

use image::io::Reader as ImageReader;
use image::ImageFormat;
use thiserror::Error;

use crate::gpu::{
    full_mip_chain, GpuDevice, GpuError, GpuTextureFormat, ImageLayout, SamplerDescriptor,
    TextureDescriptor, UploadContext,
};
use crate::loader::ImageEncoding;

/// Error type for texture decoding and upload
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Image decoding error: {0}")]
    DecodeError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid texture dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Pixel buffer holds {actual} bytes, {expected} expected")]
    PixelSizeMismatch { expected: usize, actual: usize },

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Tightly packed RGBA8 pixels
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Decode embedded PNG/JPEG bytes to RGBA8, forcing four channels.
///
/// The container is sniffed from the bytes; `encoding` only rules out RAW
/// payloads, which carry no dimensions and cannot be decoded here.
pub fn decode_rgba8(
    bytes: &[u8],
    encoding: Option<ImageEncoding>,
) -> Result<DecodedImage, TextureError> {
    if bytes.is_empty() {
        return Err(TextureError::DecodeError("empty image data".to_string()));
    }
    if encoding == Some(ImageEncoding::Raw) {
        return Err(TextureError::UnsupportedFormat(
            "RAW texture payloads are not supported".to_string(),
        ));
    }

    let format =
        image::guess_format(bytes).map_err(|e| TextureError::DecodeError(e.to_string()))?;

    match format {
        ImageFormat::Jpeg | ImageFormat::Png => {}
        _ => {
            return Err(TextureError::UnsupportedFormat(format!(
                "Only JPG/JPEG and PNG formats are supported, got {:?}",
                format.extensions_str()
            )))
        }
    }

    let img = ImageReader::with_format(std::io::Cursor::new(bytes), format)
        .decode()
        .map_err(|e| TextureError::DecodeError(e.to_string()))?;

    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(TextureError::InvalidDimensions { width, height });
    }

    Ok(DecodedImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// How a texture is created on the GPU
#[derive(Debug, Clone)]
pub struct TextureUploadParams {
    pub srgb: bool,
    /// `max_lod` is overwritten with the final mip count
    pub sampler: SamplerDescriptor,
    pub generate_mipmaps: bool,
}

impl Default for TextureUploadParams {
    fn default() -> Self {
        Self {
            srgb: false,
            sampler: SamplerDescriptor::default(),
            generate_mipmaps: true,
        }
    }
}

/// Sampled 2D texture: image (with its memory), view and sampler
pub struct TextureAsset<G: GpuDevice> {
    pub debug_name: String,
    image: Option<G::Image>,
    view: Option<G::ImageView>,
    sampler: Option<G::Sampler>,
    width: u32,
    height: u32,
    mip_levels: u32,
    format: GpuTextureFormat,
}

impl<G: GpuDevice> std::fmt::Debug for TextureAsset<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureAsset")
            .field("debug_name", &self.debug_name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mip_levels", &self.mip_levels)
            .field("format", &self.format)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<G: GpuDevice> Default for TextureAsset<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GpuDevice> TextureAsset<G> {
    pub fn new() -> Self {
        Self {
            debug_name: String::new(),
            image: None,
            view: None,
            sampler: None,
            width: 0,
            height: 0,
            mip_levels: 0,
            format: GpuTextureFormat::Rgba8Unorm,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.image.is_some() && self.view.is_some() && self.sampler.is_some()
    }

    pub fn image(&self) -> Option<&G::Image> {
        self.image.as_ref()
    }

    pub fn view(&self) -> Option<G::ImageView> {
        self.view
    }

    pub fn sampler(&self) -> Option<G::Sampler> {
        self.sampler
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> GpuTextureFormat {
        self.format
    }

    /// Approximate device memory used by the sampled mip chain
    pub fn gpu_bytes(&self) -> u64 {
        let bpp = u64::from(self.format.bytes_per_pixel());
        (0..self.mip_levels)
            .map(|level| {
                let w = u64::from((self.width >> level).max(1));
                let h = u64::from((self.height >> level).max(1));
                w * h * bpp
            })
            .sum()
    }

    /// Record the upload of RGBA8 pixels into `ctx`.
    ///
    /// The image, view and sampler exist when this returns `Ok`; the pixels
    /// are only on the GPU once `ctx` has been submitted. On `Err` whatever
    /// was created stays owned by `self`: abort the context, then call
    /// [`TextureAsset::destroy`].
    pub fn upload_rgba8_deferred(
        &mut self,
        ctx: &mut UploadContext<'_, G>,
        pixels: &[u8],
        width: u32,
        height: u32,
        params: &TextureUploadParams,
    ) -> Result<(), TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(TextureError::PixelSizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let gpu = ctx.gpu();
        if self.image.is_some() {
            self.destroy(gpu);
        }

        let format = GpuTextureFormat::rgba8(params.srgb);
        let mut mip_levels = 1;
        if params.generate_mipmaps {
            if gpu.supports_mipmap_blit(format) {
                mip_levels = full_mip_chain(width, height);
            } else {
                log::warn!(
                    "Format {format:?} cannot be blitted on {}; '{}' uploads without mipmaps",
                    gpu.backend_name(),
                    self.debug_name
                );
            }
        }

        self.width = width;
        self.height = height;
        self.format = format;
        self.mip_levels = mip_levels;

        let desc = TextureDescriptor {
            width,
            height,
            format,
            mip_levels,
        };
        let image = self.image.insert(gpu.create_image(&desc)?);

        ctx.cmd_transition_image_layout(
            image,
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
            0,
            mip_levels,
        );
        ctx.upload_image_level0(pixels, image, width, height)?;

        let mut generated = false;
        if mip_levels > 1 {
            match ctx.cmd_generate_mipmaps(image, width, height, mip_levels) {
                Ok(()) => generated = true,
                Err(e) => {
                    log::warn!(
                        "Mipmap generation failed for '{}' ({e}); using a single level",
                        self.debug_name
                    );
                    self.mip_levels = 1;
                }
            }
        }
        if !generated {
            // The image keeps its allocated levels; all of them leave TransferDst
            ctx.cmd_transition_image_layout(
                image,
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly,
                0,
                mip_levels,
            );
        }

        let view_desc = TextureDescriptor {
            mip_levels: self.mip_levels,
            ..desc
        };
        self.view = Some(gpu.create_image_view(image, &view_desc)?);

        let sampler = SamplerDescriptor {
            max_lod: (self.mip_levels - 1) as f32,
            ..params.sampler.clone()
        };
        self.sampler = Some(gpu.create_sampler(&sampler)?);

        log::trace!(
            "Texture '{}' recorded ({}x{}, {} mips, {:?})",
            self.debug_name,
            width,
            height,
            self.mip_levels,
            format
        );
        Ok(())
    }

    /// Decode PNG/JPEG bytes and record their upload
    pub fn upload_encoded_image_deferred(
        &mut self,
        ctx: &mut UploadContext<'_, G>,
        bytes: &[u8],
        encoding: Option<ImageEncoding>,
        params: &TextureUploadParams,
    ) -> Result<(), TextureError> {
        let decoded = decode_rgba8(bytes, encoding)?;
        self.upload_rgba8_deferred(ctx, &decoded.pixels, decoded.width, decoded.height, params)
    }

    /// Destroy sampler, view and image; safe to call more than once
    pub fn destroy(&mut self, gpu: &G) {
        if let Some(sampler) = self.sampler.take() {
            gpu.destroy_sampler(sampler);
        }
        if let Some(view) = self.view.take() {
            gpu.destroy_image_view(view);
        }
        if let Some(image) = self.image.take() {
            gpu.destroy_image(image);
        }
        self.width = 0;
        self.height = 0;
        self.mip_levels = 0;
        self.format = GpuTextureFormat::Rgba8Unorm;
    }
}
