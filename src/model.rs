//! CPU-side material and model assets
//!
//! Neither owns GPU resources. Materials point at textures and models point
//! at meshes and materials through handles; the `AssetManager` holds the
//! matching reference counts.

use crate::handle::{MaterialHandle, MeshHandle, TextureHandle};
use crate::loader::{
    AlphaMode, AnimationPath, AnimationValueType, Interpolation, MaterialRecord, SModelFile,
    TextureSlot,
};
use std::collections::HashMap;

/// Material properties for PBR rendering
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAsset {
    pub debug_name: String,

    /// Base color factor (RGBA)
    pub base_color_factor: [f32; 4],
    /// Emissive factor (RGB)
    pub emissive_factor: [f32; 3],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,

    pub alpha_mode: AlphaMode,
    /// Alpha cutoff for masked blending
    pub alpha_cutoff: f32,
    pub double_sided: bool,

    pub base_color_texture: Option<TextureHandle>,
    pub normal_texture: Option<TextureHandle>,
    /// B: metallic, G: roughness
    pub metallic_roughness_texture: Option<TextureHandle>,
    pub occlusion_texture: Option<TextureHandle>,
    pub emissive_texture: Option<TextureHandle>,

    pub base_color_tex_coord: u32,
    pub normal_tex_coord: u32,
    pub metallic_roughness_tex_coord: u32,
    pub occlusion_tex_coord: u32,
    pub emissive_tex_coord: u32,
}

impl Default for MaterialAsset {
    fn default() -> Self {
        Self {
            debug_name: String::new(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            emissive_factor: [0.0, 0.0, 0.0],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            normal_texture: None,
            metallic_roughness_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            base_color_tex_coord: 0,
            normal_tex_coord: 0,
            metallic_roughness_tex_coord: 0,
            occlusion_tex_coord: 0,
            emissive_tex_coord: 0,
        }
    }
}

impl MaterialAsset {
    /// Build from a validated record; `textures` maps file texture indices to handles
    pub fn from_record(record: &MaterialRecord, name: &str, textures: &[TextureHandle]) -> Self {
        let mut material = Self {
            debug_name: name.to_string(),
            base_color_factor: record.base_color_factor,
            emissive_factor: record.emissive_factor,
            metallic_factor: record.metallic_factor,
            roughness_factor: record.roughness_factor,
            normal_scale: record.normal_scale,
            occlusion_strength: record.occlusion_strength,
            alpha_mode: AlphaMode::from_raw(record.alpha_mode).unwrap_or_default(),
            alpha_cutoff: record.alpha_cutoff,
            double_sided: record.double_sided != 0,
            ..Default::default()
        };

        for slot in TextureSlot::ALL {
            let handle = record
                .texture_index(slot)
                .and_then(|index| textures.get(index as usize).copied());
            material.set_texture(slot, handle);
            *material.tex_coord_mut(slot) = record.tex_coord(slot);
        }
        material
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        match slot {
            TextureSlot::BaseColor => self.base_color_texture,
            TextureSlot::Normal => self.normal_texture,
            TextureSlot::MetallicRoughness => self.metallic_roughness_texture,
            TextureSlot::Occlusion => self.occlusion_texture,
            TextureSlot::Emissive => self.emissive_texture,
        }
    }

    pub fn set_texture(&mut self, slot: TextureSlot, handle: Option<TextureHandle>) {
        let handle = handle.filter(|h| h.is_valid());
        match slot {
            TextureSlot::BaseColor => self.base_color_texture = handle,
            TextureSlot::Normal => self.normal_texture = handle,
            TextureSlot::MetallicRoughness => self.metallic_roughness_texture = handle,
            TextureSlot::Occlusion => self.occlusion_texture = handle,
            TextureSlot::Emissive => self.emissive_texture = handle,
        }
    }

    fn tex_coord_mut(&mut self, slot: TextureSlot) -> &mut u32 {
        match slot {
            TextureSlot::BaseColor => &mut self.base_color_tex_coord,
            TextureSlot::Normal => &mut self.normal_tex_coord,
            TextureSlot::MetallicRoughness => &mut self.metallic_roughness_tex_coord,
            TextureSlot::Occlusion => &mut self.occlusion_tex_coord,
            TextureSlot::Emissive => &mut self.emissive_tex_coord,
        }
    }

    /// Bound textures in slot order; a texture used by two slots appears twice
    pub fn texture_handles(&self) -> Vec<TextureHandle> {
        TextureSlot::ALL
            .iter()
            .filter_map(|slot| self.texture(*slot))
            .collect()
    }
}

/// One draw: mesh + material + index range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPrimitive {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub first_index: u32,
    /// 0 draws the whole mesh
    pub index_count: u32,
    pub vertex_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4], // quaternion (x, y, z, w)
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0], // identity quaternion
            scale: [1.0; 3],
        }
    }
}

/// A node in the scene hierarchy
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Indices into `ModelAsset::primitives`
    pub primitives: Vec<usize>,
    /// Local transform of the node
    pub transform: Transform,
}

/// Keyframes for one animated property
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSampler {
    pub interpolation: Interpolation,
    pub value_type: AnimationValueType,
    pub times: Vec<f32>,
    /// `times.len() * value_type.width()` floats
    pub values: Vec<f32>,
}

impl AnimationSampler {
    pub fn keyframe_count(&self) -> usize {
        self.times.len()
    }

    /// Value of keyframe `key`
    pub fn keyframe(&self, key: usize) -> Option<&[f32]> {
        let width = self.value_type.width() as usize;
        let start = key.checked_mul(width)?;
        self.values.get(start..start + width)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    pub target_node: usize,
    pub path: AnimationPath,
    /// Index into `AnimationClip::samplers`
    pub sampler: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
}

/// A loaded model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelAsset {
    pub debug_name: String,
    pub primitives: Vec<ModelPrimitive>,
    pub nodes: Vec<ModelNode>,
    pub animations: Vec<AnimationClip>,
}

impl ModelAsset {
    /// Indices of nodes without a parent
    pub fn root_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(i, _)| i)
    }

    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name == name)
    }

    pub fn animation(&self, name: &str) -> Option<&AnimationClip> {
        self.animations.iter().find(|clip| clip.name == name)
    }
}

/// Copy the node graph out of a validated file
pub fn nodes_from_file(file: &SModelFile) -> Vec<ModelNode> {
    file.nodes()
        .iter()
        .enumerate()
        .map(|(i, record)| ModelNode {
            name: file.string(record.name_str_offset).to_string(),
            parent: record.parent().map(|p| p as usize),
            children: file.node_children(i).iter().map(|c| c as usize).collect(),
            primitives: file.node_primitives(i).iter().map(|p| p as usize).collect(),
            transform: Transform {
                translation: record.translation,
                rotation: record.rotation,
                scale: record.scale,
            },
        })
        .collect()
}

/// Copy the animation clips out of a validated file.
///
/// Samplers shared between clips are duplicated so every clip is
/// self-contained.
pub fn animations_from_file(file: &SModelFile) -> Vec<AnimationClip> {
    let samplers = file.animation_samplers();

    (0..file.animation_clips().len())
        .map(|clip_index| {
            let record = file.animation_clips()[clip_index];
            let mut clip = AnimationClip {
                name: file.string(record.name_offset).to_string(),
                duration: record.duration_sec,
                ..Default::default()
            };
            let mut local: HashMap<usize, usize> = HashMap::new();

            for channel in file.clip_channels(clip_index) {
                let Some(path) = AnimationPath::from_raw(channel.path) else {
                    continue;
                };
                let global = channel.sampler_index as usize;
                let Some(sampler) = samplers.get(global) else {
                    continue;
                };
                let (Some(interpolation), Some(value_type)) = (
                    Interpolation::from_raw(sampler.interpolation),
                    AnimationValueType::from_raw(sampler.value_type),
                ) else {
                    continue;
                };

                let next = clip.samplers.len();
                let sampler_slot = *local.entry(global).or_insert(next);
                if sampler_slot == next {
                    clip.samplers.push(AnimationSampler {
                        interpolation,
                        value_type,
                        times: file.sampler_times(global).to_vec(),
                        values: file.sampler_values(global).to_vec(),
                    });
                }

                clip.channels.push(AnimationChannel {
                    target_node: channel.target_node as usize,
                    path,
                    sampler: sampler_slot,
                });
            }
            clip
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::NO_TEXTURE;

    #[test]
    fn test_material_from_record_maps_textures() {
        let textures = [TextureHandle::new(10, 1), TextureHandle::new(11, 1)];
        let record = MaterialRecord {
            base_color_texture: 1,
            emissive_texture: 1,
            normal_texture: 0,
            occlusion_texture: NO_TEXTURE,
            normal_tex_coord: 1,
            alpha_mode: 2,
            double_sided: 1,
            roughness_factor: 0.25,
            ..Default::default()
        };

        let mat = MaterialAsset::from_record(&record, "brick", &textures);
        assert_eq!(mat.debug_name, "brick");
        assert_eq!(mat.base_color_texture, Some(textures[1]));
        assert_eq!(mat.normal_texture, Some(textures[0]));
        assert_eq!(mat.occlusion_texture, None);
        assert_eq!(mat.normal_tex_coord, 1);
        assert_eq!(mat.alpha_mode, AlphaMode::Blend);
        assert!(mat.double_sided);
        assert_eq!(mat.roughness_factor, 0.25);
        assert_eq!(mat.texture_handles(), vec![textures[1], textures[0], textures[1]]);
    }

    #[test]
    fn test_set_texture_drops_invalid_handle() {
        let mut mat = MaterialAsset::default();
        mat.set_texture(TextureSlot::Normal, Some(TextureHandle::INVALID));
        assert_eq!(mat.texture(TextureSlot::Normal), None);
        assert!(mat.texture_handles().is_empty());
    }

    #[test]
    fn test_sampler_keyframe() {
        let sampler = AnimationSampler {
            interpolation: Interpolation::Linear,
            value_type: AnimationValueType::Vec3,
            times: vec![0.0, 1.0],
            values: vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0],
        };
        assert_eq!(sampler.keyframe_count(), 2);
        assert_eq!(sampler.keyframe(1), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(sampler.keyframe(2), None);
    }

    #[test]
    fn test_root_nodes_and_lookup() {
        let model = ModelAsset {
            nodes: vec![
                ModelNode {
                    name: "root".into(),
                    children: vec![1],
                    ..Default::default()
                },
                ModelNode {
                    name: "arm".into(),
                    parent: Some(0),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(model.root_nodes().collect::<Vec<_>>(), vec![0]);
        assert_eq!(model.find_node("arm"), Some(1));
        assert!(model.animation("walk").is_none());
    }
}
