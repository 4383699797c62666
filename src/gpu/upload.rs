//! Scoped transfer recording
//!
//! An [`UploadContext`] owns a transient command pool, one command buffer in
//! the recording state, and every staging buffer created while recording.
//! It ends in exactly one of two ways:
//!
//! - [`UploadContext::end_submit_and_wait`] submits once and blocks until the
//!   queue is idle;
//! - [`UploadContext::abort`] throws the recording away without submitting.
//!
//! Both free the staging buffers and destroy the pool. A context dropped
//! without either is cleaned up the same way as `abort`, with a warning.

use super::{BufferUsage, GpuDevice, GpuResult, ImageLayout};

pub struct UploadContext<'g, G: GpuDevice> {
    gpu: &'g G,
    pool: Option<G::CommandPool>,
    cmd: G::CommandBuffer,
    pending_staging: Vec<G::Buffer>,
}

impl<'g, G: GpuDevice> std::fmt::Debug for UploadContext<'g, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadContext")
            .field("backend", &self.gpu.backend_name())
            .field("cmd", &self.cmd)
            .field("pending_staging", &self.pending_staging.len())
            .finish()
    }
}

impl<'g, G: GpuDevice> UploadContext<'g, G> {
    /// Create a transient pool and start recording a primary command buffer
    pub fn begin(gpu: &'g G) -> GpuResult<Self> {
        let pool = gpu.create_command_pool()?;
        let cmd = match gpu.begin_command_buffer(pool) {
            Ok(cmd) => cmd,
            Err(e) => {
                gpu.destroy_command_pool(pool);
                return Err(e);
            }
        };

        Ok(Self {
            gpu,
            pool: Some(pool),
            cmd,
            pending_staging: Vec::new(),
        })
    }

    pub fn gpu(&self) -> &'g G {
        self.gpu
    }

    pub fn command_buffer(&self) -> G::CommandBuffer {
        self.cmd
    }

    /// Staging buffers that will be freed when the context ends
    pub fn pending_staging_count(&self) -> usize {
        self.pending_staging.len()
    }

    /// Copy `data` into a new staging buffer kept alive until the context ends
    pub fn stage(&mut self, data: &[u8]) -> GpuResult<&G::Buffer> {
        let staging = self.gpu.create_staging_buffer(data)?;
        let index = self.pending_staging.len();
        self.pending_staging.push(staging);
        Ok(&self.pending_staging[index])
    }

    /// Stage `data` and record a copy into a new device-local buffer
    pub fn upload_buffer(&mut self, data: &[u8], usage: BufferUsage) -> GpuResult<G::Buffer> {
        let gpu = self.gpu;
        let cmd = self.cmd;
        let dst = gpu.create_buffer(data.len() as u64, usage)?;

        match self.stage(data) {
            Ok(src) => {
                gpu.cmd_copy_buffer(cmd, src, &dst, data.len() as u64);
                Ok(dst)
            }
            Err(e) => {
                gpu.destroy_buffer(dst);
                Err(e)
            }
        }
    }

    /// Stage tightly packed pixels and record a copy into mip 0 of `image`
    pub fn upload_image_level0(
        &mut self,
        pixels: &[u8],
        image: &G::Image,
        width: u32,
        height: u32,
    ) -> GpuResult<()> {
        let gpu = self.gpu;
        let cmd = self.cmd;
        let src = self.stage(pixels)?;
        gpu.cmd_copy_buffer_to_image(cmd, src, image, width, height);
        Ok(())
    }

    pub fn cmd_transition_image_layout(
        &self,
        image: &G::Image,
        old: ImageLayout,
        new: ImageLayout,
        base_mip: u32,
        mip_count: u32,
    ) {
        self.gpu
            .cmd_transition_image_layout(self.cmd, image, old, new, base_mip, mip_count);
    }

    pub fn cmd_copy_buffer_to_image(
        &self,
        src: &G::Buffer,
        image: &G::Image,
        width: u32,
        height: u32,
    ) {
        self.gpu
            .cmd_copy_buffer_to_image(self.cmd, src, image, width, height);
    }

    pub fn cmd_generate_mipmaps(
        &self,
        image: &G::Image,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> GpuResult<()> {
        self.gpu
            .cmd_generate_mipmaps(self.cmd, image, width, height, mip_levels)
    }

    /// Submit the recording, wait for the queue, then release everything
    pub fn end_submit_and_wait(mut self) -> GpuResult<()> {
        log::debug!(
            "Submitting upload context ({} staging buffers, backend={})",
            self.pending_staging.len(),
            self.gpu.backend_name()
        );
        let result = self.gpu.submit_and_wait(self.cmd);
        self.release();
        result
    }

    /// Release staging buffers and the pool without submitting
    pub fn abort(mut self) {
        log::debug!(
            "Aborting upload context ({} staging buffers)",
            self.pending_staging.len()
        );
        self.release();
    }

    fn release(&mut self) {
        for staging in self.pending_staging.drain(..) {
            self.gpu.destroy_buffer(staging);
        }
        if let Some(pool) = self.pool.take() {
            self.gpu.destroy_command_pool(pool);
        }
    }
}

impl<'g, G: GpuDevice> Drop for UploadContext<'g, G> {
    fn drop(&mut self) {
        if self.pool.is_some() {
            log::warn!("UploadContext dropped without submit or abort; discarding recorded commands");
            self.release();
        }
    }
}
