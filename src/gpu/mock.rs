//! Mock GPU implementation for testing
//!
//! Provides a mock GPU that keeps every resource in memory, records commands
//! per command buffer and executes them at submission, so tests can check
//! transfers, image layouts and leaks without GPU hardware.

use super::{
    BufferUsage, GpuDevice, GpuError, GpuResult, GpuTextureFormat, ImageLayout,
    SamplerDescriptor, TextureDescriptor,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Operations whose failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    CommandPool,
    CommandBuffer,
    StagingBuffer,
    DeviceBuffer,
    Image,
    ImageView,
    Sampler,
    Submit,
    Mipmap,
}

/// Mock buffer that stores data in memory
#[derive(Clone, Debug)]
pub struct MockBuffer {
    /// Unique identifier
    pub id: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    data: Arc<RwLock<Vec<u8>>>,
}

impl MockBuffer {
    /// Get the size of the buffer
    pub fn size(&self) -> usize {
        self.data.read().len()
    }

    /// Read buffer data
    pub fn read_data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

/// Mock image: mip 0 pixels plus the current layout of every level
#[derive(Clone, Debug)]
pub struct MockImage {
    /// Unique identifier
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: GpuTextureFormat,
    pub mip_levels: u32,
    pixels: Arc<RwLock<Vec<u8>>>,
    layouts: Arc<RwLock<Vec<ImageLayout>>>,
}

impl MockImage {
    /// Mip 0 contents after the last submission
    pub fn read_pixels(&self) -> Vec<u8> {
        self.pixels.read().clone()
    }

    pub fn layouts(&self) -> Vec<ImageLayout> {
        self.layouts.read().clone()
    }

    fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.format.bytes_per_pixel())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockImageView(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockSampler(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockCommandPool(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockCommandBuffer(pub u64);

/// A recorded command
#[derive(Debug, Clone)]
pub enum MockCommand {
    CopyBuffer {
        src: MockBuffer,
        dst: MockBuffer,
        size: u64,
    },
    TransitionImage {
        image: MockImage,
        old: ImageLayout,
        new: ImageLayout,
        base_mip: u32,
        mip_count: u32,
    },
    CopyBufferToImage {
        src: MockBuffer,
        image: MockImage,
        width: u32,
        height: u32,
    },
    GenerateMipmaps {
        image: MockImage,
        mip_levels: u32,
    },
}

#[derive(Debug)]
struct CommandRecord {
    pool: u64,
    commands: Vec<MockCommand>,
    submitted: bool,
}

#[derive(Debug)]
struct MockState {
    next_id: u64,
    buffers: HashMap<u64, u64>,
    images: HashMap<u64, u64>,
    views: HashSet<u64>,
    samplers: HashMap<u64, SamplerDescriptor>,
    pools: HashSet<u64>,
    command_buffers: HashMap<u64, CommandRecord>,
    submissions: usize,
    executed: Vec<MockCommand>,
    /// Remaining successes before an operation starts failing
    failures: HashMap<MockFailure, u32>,
    blit_supported: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_id: 1,
            buffers: HashMap::new(),
            images: HashMap::new(),
            views: HashSet::new(),
            samplers: HashMap::new(),
            pools: HashSet::new(),
            command_buffers: HashMap::new(),
            submissions: 0,
            executed: Vec::new(),
            failures: HashMap::new(),
            blit_supported: true,
        }
    }
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn should_fail(&mut self, op: MockFailure) -> bool {
        match self.failures.get_mut(&op) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }

    fn record(&mut self, cmd: MockCommandBuffer, command: MockCommand) {
        match self.command_buffers.get_mut(&cmd.0) {
            Some(record) if !record.submitted => record.commands.push(command),
            _ => log::warn!("MockGpu: command recorded into invalid command buffer {}", cmd.0),
        }
    }
}

/// Mock GPU device for testing
///
/// Clones share state, so a test can keep a handle to the device it gave
/// to an `AssetManager` and inspect it afterwards.
#[derive(Clone, Debug, Default)]
pub struct MockGpu {
    state: Arc<Mutex<MockState>>,
}

impl MockGpu {
    /// Create a new mock GPU device
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail from now on
    pub fn inject_failure(&self, op: MockFailure) {
        self.fail_after(op, 0);
    }

    /// Let `op` succeed `successes` more times, then fail
    pub fn fail_after(&self, op: MockFailure, successes: u32) {
        self.state.lock().failures.insert(op, successes);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn set_mipmap_blit_supported(&self, supported: bool) {
        self.state.lock().blit_supported = supported;
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    /// Every command executed by a successful submission, in order
    pub fn executed_commands(&self) -> Vec<MockCommand> {
        self.state.lock().executed.clone()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_image_count(&self) -> usize {
        self.state.lock().images.len()
    }

    pub fn live_image_view_count(&self) -> usize {
        self.state.lock().views.len()
    }

    pub fn live_sampler_count(&self) -> usize {
        self.state.lock().samplers.len()
    }

    pub fn live_command_pool_count(&self) -> usize {
        self.state.lock().pools.len()
    }

    /// Buffers, images, views, samplers and pools still alive
    pub fn live_resource_count(&self) -> usize {
        let state = self.state.lock();
        state.buffers.len()
            + state.images.len()
            + state.views.len()
            + state.samplers.len()
            + state.pools.len()
    }

    /// Bytes held by live buffers and images
    pub fn allocated_bytes(&self) -> u64 {
        let state = self.state.lock();
        state.buffers.values().sum::<u64>() + state.images.values().sum::<u64>()
    }

    /// Descriptor a live sampler was created with
    pub fn sampler_descriptor(&self, sampler: MockSampler) -> Option<SamplerDescriptor> {
        self.state.lock().samplers.get(&sampler.0).cloned()
    }

    fn new_buffer(&self, size: u64, usage: BufferUsage, fail_as: MockFailure) -> GpuResult<MockBuffer> {
        if size == 0 {
            return Err(GpuError::InvalidSize(0));
        }

        let mut state = self.state.lock();
        if state.should_fail(fail_as) {
            return Err(GpuError::AllocationFailed(format!(
                "injected {usage:?} buffer failure"
            )));
        }

        let id = state.next_id();
        state.buffers.insert(id, size);
        log::trace!("MockBuffer {id} created (size={size}, usage={usage:?})");

        Ok(MockBuffer {
            id,
            usage,
            data: Arc::new(RwLock::new(vec![0u8; size as usize])),
        })
    }

    fn execute(command: &MockCommand) -> GpuResult<()> {
        match command {
            MockCommand::CopyBuffer { src, dst, size } => {
                let src = src.data.read();
                let mut dst = dst.data.write();
                let size = *size as usize;
                if size > src.len() || size > dst.len() {
                    return Err(GpuError::UploadFailed(format!(
                        "copy of {size} bytes exceeds buffer bounds"
                    )));
                }
                dst[..size].copy_from_slice(&src[..size]);
            }
            MockCommand::TransitionImage {
                image,
                old,
                new,
                base_mip,
                mip_count,
            } => {
                let mut layouts = image.layouts.write();
                let start = *base_mip as usize;
                let end = start + *mip_count as usize;
                if end > layouts.len() {
                    return Err(GpuError::SubmitFailed(format!(
                        "transition of mips {start}..{end} on image {} with {} levels",
                        image.id,
                        layouts.len()
                    )));
                }
                for (level, layout) in layouts[start..end].iter_mut().enumerate() {
                    if *old != ImageLayout::Undefined && *layout != *old {
                        return Err(GpuError::SubmitFailed(format!(
                            "image {} mip {} is {:?}, barrier expects {:?}",
                            image.id,
                            start + level,
                            layout,
                            old
                        )));
                    }
                    *layout = *new;
                }
            }
            MockCommand::CopyBufferToImage {
                src,
                image,
                width,
                height,
            } => {
                if image.layouts.read().first() != Some(&ImageLayout::TransferDst) {
                    return Err(GpuError::SubmitFailed(format!(
                        "copy into image {} whose mip 0 is not TransferDst",
                        image.id
                    )));
                }
                let expected = (*width as usize) * (*height as usize) * 4;
                let src = src.data.read();
                if src.len() < expected {
                    return Err(GpuError::UploadFailed(format!(
                        "staging buffer holds {} bytes, image copy needs {expected}",
                        src.len()
                    )));
                }
                *image.pixels.write() = src[..expected].to_vec();
            }
            MockCommand::GenerateMipmaps { image, mip_levels } => {
                let mut layouts = image.layouts.write();
                let count = (*mip_levels as usize).min(layouts.len());
                if layouts[..count].iter().any(|l| *l != ImageLayout::TransferDst) {
                    return Err(GpuError::SubmitFailed(format!(
                        "mipmap generation on image {} expects every level in TransferDst",
                        image.id
                    )));
                }
                for layout in layouts[..count].iter_mut() {
                    *layout = ImageLayout::ShaderReadOnly;
                }
            }
        }
        Ok(())
    }
}

impl GpuDevice for MockGpu {
    type Buffer = MockBuffer;
    type Image = MockImage;
    type ImageView = MockImageView;
    type Sampler = MockSampler;
    type CommandPool = MockCommandPool;
    type CommandBuffer = MockCommandBuffer;

    fn create_command_pool(&self) -> GpuResult<Self::CommandPool> {
        let mut state = self.state.lock();
        if state.should_fail(MockFailure::CommandPool) {
            return Err(GpuError::CommandPoolFailed("injected failure".to_string()));
        }
        let id = state.next_id();
        state.pools.insert(id);
        Ok(MockCommandPool(id))
    }

    fn destroy_command_pool(&self, pool: Self::CommandPool) {
        let mut state = self.state.lock();
        state.pools.remove(&pool.0);
        state.command_buffers.retain(|_, record| record.pool != pool.0);
    }

    fn begin_command_buffer(&self, pool: Self::CommandPool) -> GpuResult<Self::CommandBuffer> {
        let mut state = self.state.lock();
        if state.should_fail(MockFailure::CommandBuffer) {
            return Err(GpuError::CommandPoolFailed(
                "injected command buffer failure".to_string(),
            ));
        }
        if !state.pools.contains(&pool.0) {
            return Err(GpuError::CommandPoolFailed(format!(
                "command pool {} is not alive",
                pool.0
            )));
        }
        let id = state.next_id();
        state.command_buffers.insert(
            id,
            CommandRecord {
                pool: pool.0,
                commands: Vec::new(),
                submitted: false,
            },
        );
        Ok(MockCommandBuffer(id))
    }

    fn submit_and_wait(&self, cmd: Self::CommandBuffer) -> GpuResult<()> {
        let mut state = self.state.lock();
        if state.should_fail(MockFailure::Submit) {
            return Err(GpuError::SubmitFailed("injected failure".to_string()));
        }

        let commands = match state.command_buffers.get_mut(&cmd.0) {
            Some(record) if !record.submitted => {
                record.submitted = true;
                std::mem::take(&mut record.commands)
            }
            Some(_) => {
                return Err(GpuError::SubmitFailed(format!(
                    "command buffer {} already submitted",
                    cmd.0
                )))
            }
            None => {
                return Err(GpuError::SubmitFailed(format!(
                    "unknown command buffer {}",
                    cmd.0
                )))
            }
        };

        for command in &commands {
            Self::execute(command)?;
        }

        state.submissions += 1;
        state.executed.extend(commands);
        Ok(())
    }

    fn create_staging_buffer(&self, data: &[u8]) -> GpuResult<Self::Buffer> {
        let buffer = self.new_buffer(data.len() as u64, BufferUsage::Staging, MockFailure::StagingBuffer)?;
        buffer.data.write().copy_from_slice(data);
        Ok(buffer)
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> GpuResult<Self::Buffer> {
        self.new_buffer(size, usage, MockFailure::DeviceBuffer)
    }

    fn destroy_buffer(&self, buffer: Self::Buffer) {
        if self.state.lock().buffers.remove(&buffer.id).is_none() {
            log::warn!("MockGpu: buffer {} destroyed twice", buffer.id);
        }
    }

    fn create_image(&self, desc: &TextureDescriptor) -> GpuResult<Self::Image> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(GpuError::TextureCreationFailed(
                "Invalid texture dimensions".to_string(),
            ));
        }

        let mut state = self.state.lock();
        if state.should_fail(MockFailure::Image) {
            return Err(GpuError::TextureCreationFailed("injected failure".to_string()));
        }

        let image = MockImage {
            id: state.next_id(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            mip_levels: desc.mip_levels,
            pixels: Arc::new(RwLock::new(Vec::new())),
            layouts: Arc::new(RwLock::new(vec![
                ImageLayout::Undefined;
                desc.mip_levels as usize
            ])),
        };
        state.images.insert(image.id, image.byte_size());
        log::trace!(
            "MockImage {} created ({}x{}, {} mips)",
            image.id,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        Ok(image)
    }

    fn destroy_image(&self, image: Self::Image) {
        if self.state.lock().images.remove(&image.id).is_none() {
            log::warn!("MockGpu: image {} destroyed twice", image.id);
        }
    }

    fn create_image_view(
        &self,
        image: &Self::Image,
        desc: &TextureDescriptor,
    ) -> GpuResult<Self::ImageView> {
        let mut state = self.state.lock();
        if state.should_fail(MockFailure::ImageView) {
            return Err(GpuError::ImageViewFailed("injected failure".to_string()));
        }
        if !state.images.contains_key(&image.id) || desc.mip_levels > image.mip_levels {
            return Err(GpuError::ImageViewFailed(format!(
                "view of {} mips on image {}",
                desc.mip_levels, image.id
            )));
        }
        let id = state.next_id();
        state.views.insert(id);
        Ok(MockImageView(id))
    }

    fn destroy_image_view(&self, view: Self::ImageView) {
        self.state.lock().views.remove(&view.0);
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GpuResult<Self::Sampler> {
        let mut state = self.state.lock();
        if state.should_fail(MockFailure::Sampler) {
            return Err(GpuError::SamplerFailed("injected failure".to_string()));
        }
        let id = state.next_id();
        state.samplers.insert(id, desc.clone());
        Ok(MockSampler(id))
    }

    fn destroy_sampler(&self, sampler: Self::Sampler) {
        self.state.lock().samplers.remove(&sampler.0);
    }

    fn supports_mipmap_blit(&self, _format: GpuTextureFormat) -> bool {
        self.state.lock().blit_supported
    }

    fn cmd_copy_buffer(
        &self,
        cmd: Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Buffer,
        size: u64,
    ) {
        self.state.lock().record(
            cmd,
            MockCommand::CopyBuffer {
                src: src.clone(),
                dst: dst.clone(),
                size,
            },
        );
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
        self.state.lock().record(
            cmd,
            MockCommand::TransitionImage {
                image: image.clone(),
                old,
                new,
                base_mip,
                mip_count,
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: Self::CommandBuffer,
        src: &Self::Buffer,
        image: &Self::Image,
        width: u32,
        height: u32,
    ) {
        self.state.lock().record(
            cmd,
            MockCommand::CopyBufferToImage {
                src: src.clone(),
                image: image.clone(),
                width,
                height,
            },
        );
    }

    fn cmd_generate_mipmaps(
        &self,
        cmd: Self::CommandBuffer,
        image: &Self::Image,
        _width: u32,
        _height: u32,
        mip_levels: u32,
    ) -> GpuResult<()> {
        let mut state = self.state.lock();
        if !state.blit_supported {
            return Err(GpuError::MipmapUnsupported(image.format));
        }
        if state.should_fail(MockFailure::Mipmap) {
            return Err(GpuError::UploadFailed("injected mipmap failure".to_string()));
        }
        state.record(
            cmd,
            MockCommand::GenerateMipmaps {
                image: image.clone(),
                mip_levels,
            },
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(gpu: &MockGpu) -> (MockCommandPool, MockCommandBuffer) {
        let pool = gpu.create_command_pool().unwrap();
        let cmd = gpu.begin_command_buffer(pool).unwrap();
        (pool, cmd)
    }

    #[test]
    fn test_mock_gpu_create_buffer() {
        let gpu = MockGpu::new();
        let buffer = gpu.create_buffer(1024, BufferUsage::Vertex).unwrap();

        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.usage, BufferUsage::Vertex);
        assert_eq!(gpu.allocated_bytes(), 1024);
    }

    #[test]
    fn test_mock_gpu_zero_size_buffer() {
        let gpu = MockGpu::new();
        assert!(gpu.create_buffer(0, BufferUsage::Vertex).is_err());
    }

    #[test]
    fn test_mock_gpu_destroy_buffer() {
        let gpu = MockGpu::new();
        let buffer = gpu.create_buffer(1024, BufferUsage::Index).unwrap();

        assert_eq!(gpu.allocated_bytes(), 1024);
        gpu.destroy_buffer(buffer);
        assert_eq!(gpu.allocated_bytes(), 0);
        assert_eq!(gpu.live_buffer_count(), 0);
    }

    #[test]
    fn test_copies_execute_only_on_submit() {
        let gpu = MockGpu::new();
        let (pool, cmd) = recording(&gpu);
        let src = gpu.create_staging_buffer(&[1, 2, 3, 4]).unwrap();
        let dst = gpu.create_buffer(4, BufferUsage::Vertex).unwrap();

        gpu.cmd_copy_buffer(cmd, &src, &dst, 4);
        assert_eq!(dst.read_data(), vec![0; 4]);

        gpu.submit_and_wait(cmd).unwrap();
        assert_eq!(dst.read_data(), vec![1, 2, 3, 4]);
        assert_eq!(gpu.executed_commands().len(), 1);

        gpu.destroy_command_pool(pool);
    }

    #[test]
    fn test_double_submit_rejected() {
        let gpu = MockGpu::new();
        let (_pool, cmd) = recording(&gpu);
        gpu.submit_and_wait(cmd).unwrap();
        assert!(gpu.submit_and_wait(cmd).is_err());
        assert_eq!(gpu.submission_count(), 1);
    }

    #[test]
    fn test_layout_mismatch_fails_submit() {
        let gpu = MockGpu::new();
        let (_pool, cmd) = recording(&gpu);
        let image = gpu
            .create_image(&TextureDescriptor {
                width: 4,
                height: 4,
                format: GpuTextureFormat::Rgba8Unorm,
                mip_levels: 1,
            })
            .unwrap();

        gpu.cmd_transition_image_layout(
            cmd,
            &image,
            ImageLayout::TransferDst,
            ImageLayout::ShaderReadOnly,
            0,
            1,
        );
        assert!(matches!(
            gpu.submit_and_wait(cmd),
            Err(GpuError::SubmitFailed(_))
        ));
    }

    #[test]
    fn test_mipmaps_leave_all_levels_readable() {
        let gpu = MockGpu::new();
        let (_pool, cmd) = recording(&gpu);
        let desc = TextureDescriptor {
            width: 8,
            height: 8,
            format: GpuTextureFormat::Rgba8Srgb,
            mip_levels: 4,
        };
        let image = gpu.create_image(&desc).unwrap();
        let staging = gpu.create_staging_buffer(&[255; 8 * 8 * 4]).unwrap();

        gpu.cmd_transition_image_layout(
            cmd,
            &image,
            ImageLayout::Undefined,
            ImageLayout::TransferDst,
            0,
            4,
        );
        gpu.cmd_copy_buffer_to_image(cmd, &staging, &image, 8, 8);
        gpu.cmd_generate_mipmaps(cmd, &image, 8, 8, 4).unwrap();
        gpu.submit_and_wait(cmd).unwrap();

        assert_eq!(image.layouts(), vec![ImageLayout::ShaderReadOnly; 4]);
        assert_eq!(image.read_pixels().len(), 8 * 8 * 4);
    }

    #[test]
    fn test_fail_after_counts_successes() {
        let gpu = MockGpu::new();
        gpu.fail_after(MockFailure::Sampler, 1);

        let desc = SamplerDescriptor::default();
        assert!(gpu.create_sampler(&desc).is_ok());
        assert!(gpu.create_sampler(&desc).is_err());
        assert!(gpu.create_sampler(&desc).is_err());

        gpu.clear_failures();
        assert!(gpu.create_sampler(&desc).is_ok());
        assert_eq!(gpu.live_sampler_count(), 2);
    }

    #[test]
    fn test_mock_gpu_clone_shares_state() {
        let gpu1 = MockGpu::new();
        let _buffer = gpu1.create_buffer(1024, BufferUsage::Vertex).unwrap();

        let gpu2 = gpu1.clone();
        assert_eq!(gpu2.allocated_bytes(), 1024);
    }
}
