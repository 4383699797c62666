//! CPU mesh data and GPU mesh assets

use crate::gpu::{BufferUsage, GpuDevice, GpuError, GpuResult, UploadContext};
use crate::loader::IndexFormat;

/// Index list in its stored width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshIndices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Default for MeshIndices {
    fn default() -> Self {
        MeshIndices::U16(Vec::new())
    }
}

impl MeshIndices {
    /// Decode little-endian index bytes; a trailing partial index is ignored
    pub fn from_le_bytes(format: IndexFormat, bytes: &[u8]) -> Self {
        match format {
            IndexFormat::U16 => MeshIndices::U16(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            IndexFormat::U32 => MeshIndices::U32(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
        }
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            MeshIndices::U16(v) => v.iter().flat_map(|i| i.to_le_bytes()).collect(),
            MeshIndices::U32(v) => v.iter().flat_map(|i| i.to_le_bytes()).collect(),
        }
    }

    pub fn format(&self) -> IndexFormat {
        match self {
            MeshIndices::U16(_) => IndexFormat::U16,
            MeshIndices::U32(_) => IndexFormat::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MeshIndices::U16(v) => v.len(),
            MeshIndices::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// CPU-resident mesh, ready to upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertex_bytes: Vec<u8>,
    pub indices: MeshIndices,
    pub vertex_count: u32,
    pub vertex_stride: u32,
    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
}

impl MeshData {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn index_format(&self) -> IndexFormat {
        self.indices.format()
    }
}

/// Vertex and index buffers of one mesh
pub struct MeshAsset<G: GpuDevice> {
    pub debug_name: String,
    vertex_buffer: Option<G::Buffer>,
    index_buffer: Option<G::Buffer>,
    vertex_count: u32,
    index_count: u32,
    vertex_stride: u32,
    index_format: IndexFormat,
    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
}

impl<G: GpuDevice> std::fmt::Debug for MeshAsset<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshAsset")
            .field("debug_name", &self.debug_name)
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .field("vertex_stride", &self.vertex_stride)
            .field("index_format", &self.index_format)
            .finish()
    }
}

impl<G: GpuDevice> MeshAsset<G> {
    /// Upload `data` through a dedicated upload context and wait for it.
    ///
    /// A mesh without indices gets no index buffer. On failure every buffer
    /// created so far is destroyed.
    pub fn upload(gpu: &G, data: &MeshData) -> GpuResult<Self> {
        if data.vertex_bytes.is_empty() || data.vertex_count == 0 || data.vertex_stride == 0 {
            return Err(GpuError::InvalidSize(data.vertex_bytes.len()));
        }

        let mut ctx = UploadContext::begin(gpu)?;

        let vertex_buffer = match ctx.upload_buffer(&data.vertex_bytes, BufferUsage::Vertex) {
            Ok(buffer) => buffer,
            Err(e) => {
                ctx.abort();
                return Err(e);
            }
        };

        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            match ctx.upload_buffer(&data.indices.to_le_bytes(), BufferUsage::Index) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    ctx.abort();
                    gpu.destroy_buffer(vertex_buffer);
                    return Err(e);
                }
            }
        };

        if let Err(e) = ctx.end_submit_and_wait() {
            gpu.destroy_buffer(vertex_buffer);
            if let Some(buffer) = index_buffer {
                gpu.destroy_buffer(buffer);
            }
            return Err(e);
        }

        Ok(Self {
            debug_name: String::new(),
            vertex_buffer: Some(vertex_buffer),
            index_buffer,
            vertex_count: data.vertex_count,
            index_count: data.index_count(),
            vertex_stride: data.vertex_stride,
            index_format: data.index_format(),
            aabb_min: data.aabb_min,
            aabb_max: data.aabb_max,
        })
    }

    pub fn vertex_buffer(&self) -> Option<&G::Buffer> {
        self.vertex_buffer.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&G::Buffer> {
        self.index_buffer.as_ref()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    pub fn gpu_bytes(&self) -> u64 {
        u64::from(self.vertex_count) * u64::from(self.vertex_stride)
            + u64::from(self.index_count) * self.index_format.size_bytes()
    }

    pub fn is_valid(&self) -> bool {
        self.vertex_buffer.is_some()
    }

    /// Release both buffers; safe to call more than once
    pub fn destroy(&mut self, gpu: &G) {
        if let Some(buffer) = self.vertex_buffer.take() {
            gpu.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            gpu.destroy_buffer(buffer);
        }
        self.vertex_count = 0;
        self.index_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::mock::{MockFailure, MockGpu};

    fn quad() -> MeshData {
        MeshData {
            vertex_bytes: (0..4 * 8).map(|i| i as u8).collect(),
            indices: MeshIndices::U32(vec![0, 1, 2, 2, 3, 0]),
            vertex_count: 4,
            vertex_stride: 8,
            aabb_min: [0.0; 3],
            aabb_max: [1.0; 3],
        }
    }

    #[test]
    fn test_indices_from_le_bytes() {
        let bytes = [1u8, 0, 2, 0, 3];
        assert_eq!(
            MeshIndices::from_le_bytes(IndexFormat::U16, &bytes),
            MeshIndices::U16(vec![1, 2])
        );
        let wide = MeshIndices::U32(vec![7, 70000]);
        assert_eq!(MeshIndices::from_le_bytes(IndexFormat::U32, &wide.to_le_bytes()), wide);
    }

    #[test]
    fn test_upload_copies_buffers() {
        let gpu = MockGpu::new();
        let data = quad();
        let mut mesh = MeshAsset::upload(&gpu, &data).unwrap();

        assert_eq!(gpu.submission_count(), 1);
        assert_eq!(mesh.vertex_buffer().unwrap().read_data(), data.vertex_bytes);
        assert_eq!(mesh.index_buffer().unwrap().read_data(), data.indices.to_le_bytes());
        assert_eq!(mesh.index_format(), IndexFormat::U32);
        assert_eq!(mesh.gpu_bytes(), 32 + 24);
        // staging buffers and the pool are gone
        assert_eq!(gpu.live_buffer_count(), 2);
        assert_eq!(gpu.live_command_pool_count(), 0);

        mesh.destroy(&gpu);
        mesh.destroy(&gpu);
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn test_upload_without_indices() {
        let gpu = MockGpu::new();
        let data = MeshData {
            indices: MeshIndices::default(),
            ..quad()
        };
        let mesh = MeshAsset::upload(&gpu, &data).unwrap();
        assert!(mesh.index_buffer().is_none());
        assert_eq!(mesh.index_count(), 0);
    }

    #[test]
    fn test_failed_upload_leaks_nothing() {
        let gpu = MockGpu::new();
        gpu.fail_after(MockFailure::DeviceBuffer, 1);
        assert!(MeshAsset::upload(&gpu, &quad()).is_err());
        assert_eq!(gpu.live_resource_count(), 0);

        gpu.clear_failures();
        gpu.inject_failure(MockFailure::Submit);
        assert!(MeshAsset::upload(&gpu, &quad()).is_err());
        assert_eq!(gpu.live_resource_count(), 0);
    }
}
