//! Integration tests for the GPU upload path

use smod_asset::gpu::mock::{MockCommand, MockFailure};
use smod_asset::{
    BufferUsage, GpuDevice, GpuTextureFormat, ImageLayout, MeshAsset, MeshData, MeshIndices,
    MockGpu, TextureAsset, TextureUploadParams, UploadContext,
};

fn checker(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| if i % 2 == 0 { [255, 255, 255, 255] } else { [0, 0, 0, 255] })
        .collect()
}

#[test]
fn test_upload_context_is_generic() {
    fn upload_bytes<G: GpuDevice>(gpu: &G, data: &[u8]) -> G::Buffer {
        let mut ctx = UploadContext::begin(gpu).unwrap();
        let buffer = ctx.upload_buffer(data, BufferUsage::Vertex).unwrap();
        ctx.end_submit_and_wait().unwrap();
        buffer
    }

    let gpu = MockGpu::new();
    let buffer = upload_bytes(&gpu, &[1, 2, 3, 4]);
    assert_eq!(buffer.read_data(), vec![1, 2, 3, 4]);
    assert_eq!(gpu.live_buffer_count(), 1);
    assert_eq!(gpu.live_command_pool_count(), 0);
}

#[test]
fn test_batched_textures_end_shader_readable() {
    let gpu = MockGpu::new();
    let params = TextureUploadParams::default();
    let srgb = TextureUploadParams {
        srgb: true,
        ..Default::default()
    };
    let mut a = TextureAsset::new();
    let mut b = TextureAsset::new();

    let mut ctx = UploadContext::begin(&gpu).unwrap();
    a.upload_rgba8_deferred(&mut ctx, &checker(8, 8), 8, 8, &srgb).unwrap();
    b.upload_rgba8_deferred(&mut ctx, &checker(3, 5), 3, 5, &params).unwrap();
    ctx.end_submit_and_wait().unwrap();

    assert_eq!(gpu.submission_count(), 1);
    assert_eq!(a.mip_levels(), 4);
    assert_eq!(b.mip_levels(), 3);
    assert_eq!(a.format(), GpuTextureFormat::Rgba8Srgb);
    assert_eq!(b.format(), GpuTextureFormat::Rgba8Unorm);

    for texture in [&a, &b] {
        let image = texture.image().unwrap();
        assert!(image
            .layouts()
            .iter()
            .all(|layout| *layout == ImageLayout::ShaderReadOnly));
    }
    assert_eq!(a.image().unwrap().read_pixels(), checker(8, 8));

    let mips = gpu
        .executed_commands()
        .iter()
        .filter(|c| matches!(c, MockCommand::GenerateMipmaps { .. }))
        .count();
    assert_eq!(mips, 2);

    a.destroy(&gpu);
    b.destroy(&gpu);
    assert_eq!(gpu.live_resource_count(), 0);
}

#[test]
fn test_aborted_batch_releases_staging() {
    let gpu = MockGpu::new();
    let mut texture = TextureAsset::new();

    let mut ctx = UploadContext::begin(&gpu).unwrap();
    texture
        .upload_rgba8_deferred(&mut ctx, &checker(4, 4), 4, 4, &TextureUploadParams::default())
        .unwrap();
    assert_eq!(ctx.pending_staging_count(), 1);
    ctx.abort();

    assert_eq!(gpu.submission_count(), 0);
    texture.destroy(&gpu);
    assert_eq!(gpu.live_resource_count(), 0);
}

#[test]
fn test_sampler_failure_leaves_texture_destroyable() {
    let gpu = MockGpu::new();
    gpu.inject_failure(MockFailure::Sampler);
    let mut texture = TextureAsset::new();

    let mut ctx = UploadContext::begin(&gpu).unwrap();
    let result =
        texture.upload_rgba8_deferred(&mut ctx, &checker(2, 2), 2, 2, &TextureUploadParams::default());
    assert!(result.is_err());
    ctx.abort();

    texture.destroy(&gpu);
    assert_eq!(gpu.live_resource_count(), 0);
}

#[test]
fn test_mipmap_failure_leaves_every_level_readable() {
    let gpu = MockGpu::new();
    gpu.inject_failure(MockFailure::Mipmap);
    let mut texture = TextureAsset::new();

    let mut ctx = UploadContext::begin(&gpu).unwrap();
    texture
        .upload_rgba8_deferred(&mut ctx, &checker(8, 8), 8, 8, &TextureUploadParams::default())
        .unwrap();
    ctx.end_submit_and_wait().unwrap();

    assert!(texture.is_valid());
    assert_eq!(texture.mip_levels(), 1);
    let image = texture.image().unwrap();
    assert_eq!(image.mip_levels, 4);
    assert_eq!(image.layouts(), vec![ImageLayout::ShaderReadOnly; 4]);
    assert_eq!(image.read_pixels(), checker(8, 8));

    let sampler = gpu.sampler_descriptor(texture.sampler().unwrap()).unwrap();
    assert_eq!(sampler.max_lod, 0.0);
    assert!(!gpu
        .executed_commands()
        .iter()
        .any(|c| matches!(c, MockCommand::GenerateMipmaps { .. })));

    texture.destroy(&gpu);
    assert_eq!(gpu.live_resource_count(), 0);
}

#[test]
fn test_mesh_upload_round_trip() {
    let gpu = MockGpu::new();
    let data = MeshData {
        vertex_bytes: (0..48).collect(),
        indices: MeshIndices::U16(vec![0, 1, 2, 2, 3, 0]),
        vertex_count: 4,
        vertex_stride: 12,
        aabb_min: [-1.0; 3],
        aabb_max: [1.0; 3],
    };

    let mut mesh = MeshAsset::upload(&gpu, &data).unwrap();
    assert_eq!(mesh.vertex_buffer().unwrap().read_data(), data.vertex_bytes);
    assert_eq!(mesh.index_buffer().unwrap().read_data(), data.indices.to_le_bytes());
    assert_eq!(mesh.gpu_bytes(), 48 + 12);

    mesh.destroy(&gpu);
    assert!(!mesh.is_valid());
    assert_eq!(gpu.live_resource_count(), 0);
}
