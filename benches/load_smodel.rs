//! Benchmark: `.smodel` validation and model load through the asset manager

use bytemuck::Zeroable;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use smod_asset::loader::*;
use smod_asset::{AssetManager, MockGpu};

/// One mesh of `vertex_count` vertices (stride 32) and one primitive
fn mesh_file(vertex_count: u32) -> Vec<u8> {
    let stride = 32u32;
    let vertex_bytes = vec![0u8; (vertex_count * stride) as usize];
    let indices: Vec<u8> = (0..vertex_count)
        .flat_map(|i| i.to_le_bytes())
        .collect();

    let mesh = MeshRecord {
        name_str_offset: 0,
        vertex_stride: stride,
        vertex_count,
        index_count: vertex_count,
        layout_flags: 0,
        index_type: 1,
        vertex_data_offset: 0,
        vertex_data_size: vertex_bytes.len() as u64,
        index_data_offset: vertex_bytes.len() as u64,
        index_data_size: indices.len() as u64,
        aabb_min: [0.0; 3],
        aabb_max: [1.0; 3],
    };
    let material = MaterialRecord::default();
    let primitive = PrimitiveRecord {
        index_count: vertex_count,
        ..Default::default()
    };

    let mut out = vec![0u8; HEADER_V1_SIZE];
    let mut header: SModelHeaderV1 = Zeroable::zeroed();
    header.magic = SMOD_MAGIC;
    header.version_major = 1;
    header.mesh_count = 1;
    header.primitive_count = 1;
    header.material_count = 1;

    header.meshes_offset = out.len() as u64;
    out.extend_from_slice(bytemuck::bytes_of(&mesh));
    header.primitives_offset = out.len() as u64;
    out.extend_from_slice(bytemuck::bytes_of(&primitive));
    header.materials_offset = out.len() as u64;
    out.extend_from_slice(bytemuck::bytes_of(&material));
    header.textures_offset = out.len() as u64;
    header.string_table_offset = out.len() as u64;
    header.string_table_size = 1;
    out.push(0);
    header.blob_offset = out.len() as u64;
    header.blob_size = (vertex_bytes.len() + indices.len()) as u64;
    out.extend_from_slice(&vertex_bytes);
    out.extend_from_slice(&indices);
    header.file_size_bytes = out.len() as u32;

    out[..HEADER_V1_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
    out
}

fn load_smodel_benchmark(c: &mut Criterion) {
    let bytes = mesh_file(100_000);

    c.bench_function("validate_3mb_smodel", |b| {
        b.iter(|| {
            let file = SModelFile::from_bytes(black_box(bytes.clone())).unwrap();
            black_box(file.mesh_count())
        })
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.smodel");
    std::fs::write(&path, &bytes).unwrap();

    c.bench_function("load_model_and_gc", |b| {
        let mut assets = AssetManager::new(MockGpu::new());
        b.iter(|| {
            let model = assets.load_model(&path);
            assets.release_model(model);
            black_box(assets.garbage_collect())
        })
    });

    c.bench_function("load_model_cache_hit", |b| {
        let mut assets = AssetManager::new(MockGpu::new());
        let model = assets.load_model(&path);
        b.iter(|| {
            let again = assets.load_model(&path);
            assets.release_model(again);
            black_box(again)
        });
        assets.release_model(model);
    });
}

criterion_group!(benches, load_smodel_benchmark);
criterion_main!(benches);
