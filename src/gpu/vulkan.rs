//! Vulkan GPU implementation
//!
//! Provides a Vulkan backend using `ash` and `vk-mem`.

use super::{
    BufferUsage, FilterMode, GpuDevice, GpuError, GpuResult, GpuTextureFormat, ImageLayout,
    MipmapMode, SamplerDescriptor, TextureDescriptor, WrapMode,
};
use ash::vk;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use vk_mem::Alloc;

/// Inner state for VulkanBuffer that holds the actual Vulkan resources
struct VulkanBufferInner {
    /// Vulkan buffer handle
    buffer: vk::Buffer,
    /// VMA allocation
    allocation: vk_mem::Allocation,
    /// Buffer size in bytes
    size: u64,
    /// Reference to allocator for cleanup
    allocator: Arc<Mutex<vk_mem::Allocator>>,
}

impl Drop for VulkanBufferInner {
    fn drop(&mut self) {
        let allocator = self.allocator.lock();
        unsafe {
            allocator.destroy_buffer(self.buffer, &mut self.allocation);
        }
        log::trace!("VulkanBuffer destroyed (size={})", self.size);
    }
}

/// Vulkan buffer with associated allocation
pub struct VulkanBuffer {
    inner: Arc<Mutex<VulkanBufferInner>>,
    /// Vulkan buffer handle (cached for quick access)
    pub buffer: vk::Buffer,
    /// Buffer size in bytes (cached for quick access)
    pub size: u64,
    /// Buffer usage (cached for quick access)
    pub usage: BufferUsage,
}

impl fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

impl VulkanBuffer {
    /// Get the raw Vulkan buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

/// Inner state for VulkanImage that holds the actual Vulkan resources
struct VulkanImageInner {
    image: vk::Image,
    allocation: vk_mem::Allocation,
    allocator: Arc<Mutex<vk_mem::Allocator>>,
}

impl Drop for VulkanImageInner {
    fn drop(&mut self) {
        let allocator = self.allocator.lock();
        unsafe {
            allocator.destroy_image(self.image, &mut self.allocation);
        }
        log::trace!("VulkanImage destroyed");
    }
}

/// Sampled 2D image with its device memory
pub struct VulkanImage {
    #[allow(dead_code)]
    inner: Arc<Mutex<VulkanImageInner>>,
    /// Vulkan image handle (cached for quick access)
    pub image: vk::Image,
    pub width: u32,
    pub height: u32,
    pub format: GpuTextureFormat,
    pub mip_levels: u32,
}

impl fmt::Debug for VulkanImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("mip_levels", &self.mip_levels)
            .finish()
    }
}

impl VulkanImage {
    /// Get the raw Vulkan image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }
}

/// Vulkan GPU device wrapper
///
/// Wraps `ash::Device`, the graphics queue and a VMA allocator to implement
/// the `GpuDevice` trait. The queue is used without internal locking; callers
/// keep uploads on one thread.
#[derive(Clone)]
pub struct VulkanDevice {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family_index: u32,
    allocator: Arc<Mutex<vk_mem::Allocator>>,
    /// 0.0 when the device lacks `samplerAnisotropy`
    max_sampler_anisotropy: f32,
}

impl fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("backend", &"Vulkan")
            .field("queue_family_index", &self.queue_family_index)
            .finish()
    }
}

impl VulkanDevice {
    /// Create a new Vulkan device wrapper
    ///
    /// # Arguments
    /// * `instance` - Instance the physical device was enumerated from
    /// * `physical_device` - Used for format and limit queries
    /// * `device` - The ash Vulkan device
    /// * `queue` / `queue_family_index` - Graphics queue used for uploads
    /// * `allocator` - VMA allocator for memory management
    pub fn new(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue: vk::Queue,
        queue_family_index: u32,
        allocator: Arc<Mutex<vk_mem::Allocator>>,
    ) -> Self {
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let max_sampler_anisotropy = if features.sampler_anisotropy == vk::TRUE {
            let props = unsafe { instance.get_physical_device_properties(physical_device) };
            props.limits.max_sampler_anisotropy
        } else {
            0.0
        };

        Self {
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            allocator,
            max_sampler_anisotropy,
        }
    }

    /// Get the underlying ash device
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the allocator
    pub fn allocator(&self) -> &Arc<Mutex<vk_mem::Allocator>> {
        &self.allocator
    }

    fn to_vk_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
        match usage {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    fn to_vk_format(format: GpuTextureFormat) -> vk::Format {
        match format {
            GpuTextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            GpuTextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }

    fn to_vk_layout(layout: ImageLayout) -> vk::ImageLayout {
        match layout {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Access mask and pipeline stage that touch an image in `layout`
    fn layout_sync(layout: ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
        match layout {
            ImageLayout::Undefined => (
                vk::AccessFlags::empty(),
                vk::PipelineStageFlags::TOP_OF_PIPE,
            ),
            ImageLayout::TransferDst => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            ImageLayout::TransferSrc => (
                vk::AccessFlags::TRANSFER_READ,
                vk::PipelineStageFlags::TRANSFER,
            ),
            ImageLayout::ShaderReadOnly => (
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
        }
    }

    fn to_vk_wrap(wrap: WrapMode) -> vk::SamplerAddressMode {
        match wrap {
            WrapMode::Repeat => vk::SamplerAddressMode::REPEAT,
            WrapMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            WrapMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        }
    }

    fn to_vk_filter(filter: FilterMode) -> vk::Filter {
        match filter {
            FilterMode::Nearest => vk::Filter::NEAREST,
            FilterMode::Linear => vk::Filter::LINEAR,
        }
    }

    fn to_vk_mipmap_mode(mode: MipmapMode) -> vk::SamplerMipmapMode {
        match mode {
            MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
            MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }

    fn color_range(base_mip: u32, mip_count: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: base_mip,
            level_count: mip_count,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn allocate_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        allocation_info: &vk_mem::AllocationCreateInfo,
    ) -> GpuResult<VulkanBuffer> {
        if size == 0 {
            return Err(GpuError::InvalidSize(0));
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(Self::to_vk_buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();

        let allocator = self.allocator.lock();
        let (buffer, allocation) = unsafe {
            allocator
                .create_buffer(&buffer_info, allocation_info)
                .map_err(|e| GpuError::AllocationFailed(format!("VMA error: {e:?}")))?
        };

        let inner = VulkanBufferInner {
            buffer,
            allocation,
            size,
            allocator: Arc::clone(&self.allocator),
        };

        Ok(VulkanBuffer {
            inner: Arc::new(Mutex::new(inner)),
            buffer,
            size,
            usage,
        })
    }

    fn barrier(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old: ImageLayout,
        new: ImageLayout,
        base_mip: u32,
        mip_count: u32,
    ) {
        let (src_access, src_stage) = Self::layout_sync(old);
        let (dst_access, dst_stage) = Self::layout_sync(new);

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(Self::to_vk_layout(old))
            .new_layout(Self::to_vk_layout(new))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(Self::color_range(base_mip, mip_count))
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

impl GpuDevice for VulkanDevice {
    type Buffer = VulkanBuffer;
    type Image = VulkanImage;
    type ImageView = vk::ImageView;
    type Sampler = vk::Sampler;
    type CommandPool = vk::CommandPool;
    type CommandBuffer = vk::CommandBuffer;

    fn create_command_pool(&self) -> GpuResult<Self::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .build();

        unsafe { self.device.create_command_pool(&info, None) }
            .map_err(|e| GpuError::CommandPoolFailed(format!("{e:?}")))
    }

    fn destroy_command_pool(&self, pool: Self::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn begin_command_buffer(&self, pool: Self::CommandPool) -> GpuResult<Self::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1)
            .build();

        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| GpuError::CommandPoolFailed(format!("Failed to allocate command buffer: {e:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::CommandPoolFailed("No command buffer allocated".to_string()))?;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .build();

        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }
            .map_err(|e| GpuError::CommandPoolFailed(format!("Failed to begin command buffer: {e:?}")))?;

        Ok(cmd)
    }

    fn submit_and_wait(&self, cmd: Self::CommandBuffer) -> GpuResult<()> {
        let map_err = |e: vk::Result| match e {
            vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                GpuError::OutOfMemory
            }
            other => GpuError::SubmitFailed(format!("{other:?}")),
        };

        unsafe { self.device.end_command_buffer(cmd) }.map_err(map_err)?;

        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], vk::Fence::null())
                .map_err(map_err)?;
            self.device.queue_wait_idle(self.queue).map_err(map_err)?;
        }

        log::trace!("Vulkan upload submission completed");
        Ok(())
    }

    fn create_staging_buffer(&self, data: &[u8]) -> GpuResult<Self::Buffer> {
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ..Default::default()
        };
        let buffer = self.allocate_buffer(data.len() as u64, BufferUsage::Staging, &allocation_info)?;

        {
            let mut inner = buffer.inner.lock();
            let allocator = self.allocator.lock();

            // Map memory, copy data, flush, unmap
            let ptr = unsafe {
                allocator
                    .map_memory(&mut inner.allocation)
                    .map_err(|e| GpuError::UploadFailed(format!("Failed to map memory: {e:?}")))?
            };

            // Sequential-write memory is not guaranteed to be host-coherent
            let flushed = unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
                let flushed = allocator.flush_allocation(&inner.allocation, 0, data.len() as _);
                allocator.unmap_memory(&mut inner.allocation);
                flushed
            };
            flushed
                .map_err(|e| GpuError::UploadFailed(format!("Failed to flush staging memory: {e:?}")))?;
        }

        Ok(buffer)
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> GpuResult<Self::Buffer> {
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        self.allocate_buffer(size, usage, &allocation_info)
    }

    fn destroy_buffer(&self, _buffer: Self::Buffer) {
        // Drop is handled by VulkanBufferInner
    }

    fn create_image(&self, desc: &TextureDescriptor) -> GpuResult<Self::Image> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::TextureCreationFailed(
                "Invalid texture dimensions".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(Self::to_vk_format(desc.format))
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .build();

        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let allocator = self.allocator.lock();
        let (image, allocation) = unsafe {
            allocator
                .create_image(&image_info, &allocation_info)
                .map_err(|e| GpuError::TextureCreationFailed(format!("VMA error: {e:?}")))?
        };

        let inner = VulkanImageInner {
            image,
            allocation,
            allocator: Arc::clone(&self.allocator),
        };

        Ok(VulkanImage {
            inner: Arc::new(Mutex::new(inner)),
            image,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            mip_levels: desc.mip_levels,
        })
    }

    fn destroy_image(&self, _image: Self::Image) {
        // Drop is handled by VulkanImageInner
    }

    fn create_image_view(
        &self,
        image: &Self::Image,
        desc: &TextureDescriptor,
    ) -> GpuResult<Self::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(Self::to_vk_format(desc.format))
            .subresource_range(Self::color_range(0, desc.mip_levels))
            .build();

        unsafe { self.device.create_image_view(&view_info, None) }
            .map_err(|e| GpuError::ImageViewFailed(format!("{e:?}")))
    }

    fn destroy_image_view(&self, view: Self::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuResult<Self::Sampler> {
        let anisotropy_enable = desc.anisotropy_enabled() && self.max_sampler_anisotropy > 1.0;
        let max_anisotropy = if anisotropy_enable {
            desc.max_anisotropy.min(self.max_sampler_anisotropy)
        } else {
            1.0
        };

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(Self::to_vk_filter(desc.mag_filter))
            .min_filter(Self::to_vk_filter(desc.min_filter))
            .mipmap_mode(Self::to_vk_mipmap_mode(desc.mipmap_mode))
            .address_mode_u(Self::to_vk_wrap(desc.wrap_u))
            .address_mode_v(Self::to_vk_wrap(desc.wrap_v))
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy_enable)
            .max_anisotropy(max_anisotropy)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .build();

        unsafe { self.device.create_sampler(&info, None) }
            .map_err(|e| GpuError::SamplerFailed(format!("{e:?}")))
    }

    fn destroy_sampler(&self, sampler: Self::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn supports_mipmap_blit(&self, format: GpuTextureFormat) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, Self::to_vk_format(format))
        };
        props.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
        )
    }

    fn cmd_copy_buffer(
        &self,
        cmd: Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Buffer,
        size: u64,
    ) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
        }
    }

    fn cmd_transition_image_layout(
        &self,
        cmd: Self::CommandBuffer,
        image: &Self::Image,
        old: ImageLayout,
        new: ImageLayout,
        base_mip: u32,
        mip_count: u32,
    ) {
        self.barrier(cmd, image.image, old, new, base_mip, mip_count);
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: Self::CommandBuffer,
        src: &Self::Buffer,
        image: &Self::Image,
        width: u32,
        height: u32,
    ) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cmd,
                src.buffer,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn cmd_generate_mipmaps(
        &self,
        cmd: Self::CommandBuffer,
        image: &Self::Image,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> GpuResult<()> {
        if !self.supports_mipmap_blit(image.format) {
            return Err(GpuError::MipmapUnsupported(image.format));
        }

        let mut mip_width = width.max(1) as i32;
        let mut mip_height = height.max(1) as i32;

        for level in 1..mip_levels {
            // Previous level becomes the blit source
            self.barrier(
                cmd,
                image.image,
                ImageLayout::TransferDst,
                ImageLayout::TransferSrc,
                level - 1,
                1,
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);

            let blit = vk::ImageBlit {
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                src_offsets: [
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: mip_width,
                        y: mip_height,
                        z: 1,
                    },
                ],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                dst_offsets: [
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: next_width,
                        y: next_height,
                        z: 1,
                    },
                ],
            };

            unsafe {
                self.device.cmd_blit_image(
                    cmd,
                    image.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }

            self.barrier(
                cmd,
                image.image,
                ImageLayout::TransferSrc,
                ImageLayout::ShaderReadOnly,
                level - 1,
                1,
            );

            mip_width = next_width;
            mip_height = next_height;
        }

        // Last level was only ever written
        self.barrier(
            cmd,
            image.image,
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
            mip_levels.saturating_sub(1),
            1,
        );

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Vulkan"
    }
}
