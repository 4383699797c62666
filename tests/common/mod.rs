//! Shared fixtures: an in-memory `.smodel` writer and image helpers

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use smod_asset::loader::*;

/// Assembles `.smodel` files table by table.
///
/// Layout: header, record tables, scalar tables, string table, blob.
pub struct SModelBuilder {
    pub version_major: u16,
    pub version_minor: u16,
    pub meshes: Vec<MeshRecord>,
    pub primitives: Vec<PrimitiveRecord>,
    pub materials: Vec<MaterialRecord>,
    pub textures: Vec<TextureRecord>,
    pub nodes: Vec<NodeRecord>,
    pub node_primitive_indices: Vec<u32>,
    pub node_child_indices: Vec<u32>,
    pub clips: Vec<AnimationClipRecord>,
    pub channels: Vec<AnimationChannelRecord>,
    pub samplers: Vec<AnimationSamplerRecord>,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    strings: Vec<u8>,
    blob: Vec<u8>,
}

impl SModelBuilder {
    pub fn new(version_major: u16) -> Self {
        Self {
            version_major,
            version_minor: 0,
            meshes: Vec::new(),
            primitives: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            nodes: Vec::new(),
            node_primitive_indices: Vec::new(),
            node_child_indices: Vec::new(),
            clips: Vec::new(),
            channels: Vec::new(),
            samplers: Vec::new(),
            times: Vec::new(),
            values: Vec::new(),
            strings: vec![0],
            blob: Vec::new(),
        }
    }

    /// One triangle mesh (3 vertices, stride 32), one untextured material,
    /// one primitive drawing the whole mesh
    pub fn single_triangle() -> Self {
        let mut b = Self::new(1);
        let mesh = b.add_mesh("Triangle", 3, 32, &[0, 1, 2]);
        let material = b.add_material(MaterialRecord::default());
        b.add_primitive(mesh, material, 0, 3);
        b
    }

    pub fn add_string(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        offset
    }

    /// Append bytes to the blob at a 4-byte boundary, returning the relative offset
    pub fn add_blob(&mut self, bytes: &[u8]) -> u64 {
        while self.blob.len() % 4 != 0 {
            self.blob.push(0);
        }
        let offset = self.blob.len() as u64;
        self.blob.extend_from_slice(bytes);
        offset
    }

    pub fn add_mesh(&mut self, name: &str, vertex_count: u32, stride: u32, indices: &[u16]) -> u32 {
        let vertex_bytes: Vec<u8> = (0..vertex_count * stride).map(|i| i as u8).collect();
        let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();

        let name_str_offset = self.add_string(name);
        let vertex_data_offset = self.add_blob(&vertex_bytes);
        let index_data_offset = self.add_blob(&index_bytes);

        self.meshes.push(MeshRecord {
            name_str_offset,
            vertex_stride: stride,
            vertex_count,
            index_count: indices.len() as u32,
            layout_flags: 0,
            index_type: 0,
            vertex_data_offset,
            vertex_data_size: vertex_bytes.len() as u64,
            index_data_offset,
            index_data_size: index_bytes.len() as u64,
            aabb_min: [-1.0; 3],
            aabb_max: [1.0; 3],
        });
        self.meshes.len() as u32 - 1
    }

    pub fn add_material(&mut self, record: MaterialRecord) -> u32 {
        self.materials.push(record);
        self.materials.len() as u32 - 1
    }

    pub fn add_primitive(&mut self, mesh: u32, material: u32, first_index: u32, index_count: u32) -> u32 {
        self.primitives.push(PrimitiveRecord {
            mesh_index: mesh,
            material_index: material,
            first_index,
            index_count,
            ..Default::default()
        });
        self.primitives.len() as u32 - 1
    }

    pub fn add_texture(&mut self, name: &str, image: &[u8], encoding: ImageEncoding, color_space: ColorSpace) -> u32 {
        let name_str_offset = self.add_string(name);
        let image_data_offset = self.add_blob(image);
        self.textures.push(TextureRecord {
            name_str_offset,
            uri_str_offset: 0,
            color_space: color_space as u32,
            encoding: encoding as u32,
            wrap_u: 0,
            wrap_v: 0,
            min_filter: 1,
            mag_filter: 1,
            mip_filter: 2,
            max_anisotropy: 8.0,
            image_data_offset,
            image_data_size: image.len() as u64,
            reserved0: 0,
            reserved1: 0,
        });
        self.textures.len() as u32 - 1
    }

    pub fn add_node(&mut self, name: &str, parent: Option<u32>) -> u32 {
        let name_str_offset = self.add_string(name);
        self.nodes.push(NodeRecord {
            name_str_offset,
            parent_index: parent.unwrap_or(NO_INDEX),
            ..Default::default()
        });
        self.nodes.len() as u32 - 1
    }

    /// Point `node` at a fresh run of child indices
    pub fn set_children(&mut self, node: u32, children: &[u32]) {
        let first = self.node_child_indices.len() as u32;
        self.node_child_indices.extend_from_slice(children);
        let record = &mut self.nodes[node as usize];
        record.first_child_index = first;
        record.child_count = children.len() as u32;
    }

    pub fn set_node_primitives(&mut self, node: u32, primitives: &[u32]) {
        let first = self.node_primitive_indices.len() as u32;
        self.node_primitive_indices.extend_from_slice(primitives);
        let record = &mut self.nodes[node as usize];
        record.first_primitive_index = first;
        record.primitive_count = primitives.len() as u32;
    }

    /// Add a sampler over fresh time/value runs
    pub fn add_sampler(&mut self, times: &[f32], values: &[f32], interpolation: Interpolation, value_type: AnimationValueType) -> u32 {
        let first_time = self.times.len() as u32;
        let first_value = self.values.len() as u32;
        self.times.extend_from_slice(times);
        self.values.extend_from_slice(values);
        self.samplers.push(AnimationSamplerRecord {
            first_time,
            time_count: times.len() as u32,
            first_value,
            value_count: values.len() as u32,
            interpolation: interpolation as u8,
            value_type: value_type as u8,
            pad: 0,
        });
        self.samplers.len() as u32 - 1
    }

    /// Add a clip owning `channels` as `(target_node, path, sampler)` triples
    pub fn add_clip(&mut self, name: &str, duration: f32, channels: &[(u32, AnimationPath, u16)]) -> u32 {
        let name_offset = self.add_string(name);
        let first_channel = self.channels.len() as u32;
        for &(target_node, path, sampler_index) in channels {
            self.channels.push(AnimationChannelRecord {
                target_node,
                path: path as u16,
                sampler_index,
            });
        }
        self.clips.push(AnimationClipRecord {
            name_offset,
            duration_sec: duration,
            first_channel,
            channel_count: channels.len() as u32,
        });
        self.clips.len() as u32 - 1
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; header_size_for(self.version_major)];

        let mut header: SModelHeaderV1 = Zeroable::zeroed();
        header.magic = SMOD_MAGIC;
        header.version_major = self.version_major;
        header.version_minor = self.version_minor;
        header.mesh_count = self.meshes.len() as u32;
        header.primitive_count = self.primitives.len() as u32;
        header.material_count = self.materials.len() as u32;
        header.texture_count = self.textures.len() as u32;
        header.meshes_offset = append(&mut out, &self.meshes);
        header.primitives_offset = append(&mut out, &self.primitives);
        header.materials_offset = append(&mut out, &self.materials);
        header.textures_offset = append(&mut out, &self.textures);

        let mut nodes = SModelHeaderV2Ext::default();
        let mut animation = SModelHeaderV3Ext::default();
        if self.version_major >= 2 {
            nodes.node_count = self.nodes.len() as u32;
            nodes.node_primitive_index_count = self.node_primitive_indices.len() as u32;
            nodes.node_child_indices_count = self.node_child_indices.len() as u32;
            nodes.nodes_offset = append(&mut out, &self.nodes);
            nodes.node_primitive_indices_offset = append(&mut out, &self.node_primitive_indices);
            nodes.node_child_indices_offset = append(&mut out, &self.node_child_indices);
        }
        if self.version_major >= 3 {
            animation.anim_clips_count = self.clips.len() as u32;
            animation.anim_channels_count = self.channels.len() as u32;
            animation.anim_samplers_count = self.samplers.len() as u32;
            animation.anim_times_count = self.times.len() as u32;
            animation.anim_values_count = self.values.len() as u32;
            animation.anim_clips_offset = append(&mut out, &self.clips);
            animation.anim_channels_offset = append(&mut out, &self.channels);
            animation.anim_samplers_offset = append(&mut out, &self.samplers);
            animation.anim_times_offset = append(&mut out, &self.times);
            animation.anim_values_offset = append(&mut out, &self.values);
        }

        header.string_table_offset = append(&mut out, &self.strings);
        header.string_table_size = self.strings.len() as u64;
        header.blob_offset = append(&mut out, &self.blob);
        header.blob_size = self.blob.len() as u64;
        header.file_size_bytes = out.len() as u32;

        out[..HEADER_V1_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        if self.version_major >= 2 {
            out[HEADER_V1_SIZE..HEADER_V2_SIZE].copy_from_slice(bytemuck::bytes_of(&nodes));
        }
        if self.version_major >= 3 {
            out[HEADER_V2_SIZE..HEADER_V3_SIZE].copy_from_slice(bytemuck::bytes_of(&animation));
        }
        out
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn append<T: Pod>(out: &mut Vec<u8>, items: &[T]) -> u64 {
    let offset = out.len() as u64;
    out.extend_from_slice(bytemuck::cast_slice(items));
    offset
}

/// Overwrite a little-endian u32 at `offset`
pub fn patch_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Encode a solid-colour PNG
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

