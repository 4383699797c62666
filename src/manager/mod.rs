//! Ref-counted owner of every loaded asset
//!
//! The [`AssetManager`] owns meshes, textures, materials and models in four
//! handle tables. Callers only ever hold handles. Dependencies are counted:
//! a material holds one ref per bound texture slot, a model one ref per
//! primitive on its mesh and on its material. Nothing is destroyed when a
//! count reaches zero; [`AssetManager::garbage_collect`] reclaims in four
//! phases (models, materials, meshes, textures) so that releases cascade
//! without recursion.

pub mod metrics;

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::path::{Path, PathBuf};
use std::time::Instant;

use xxhash_rust::xxh3::Xxh3;

use crate::error::{AssetError, Result};
use crate::gpu::{
    FilterMode, GpuDevice, MipmapMode, SamplerDescriptor, UploadContext, WrapMode,
};
use crate::handle::{HandleTable, MaterialHandle, MeshHandle, ModelHandle, TextureHandle};
use crate::loader::{
    load_smesh_v0, ColorSpace, ImageEncoding, IndexFormat, SModelFile, TextureRecord, TextureSlot,
};
use crate::mesh::{MeshAsset, MeshData, MeshIndices};
use crate::model::{animations_from_file, nodes_from_file, MaterialAsset, ModelAsset, ModelPrimitive};
use crate::texture::{TextureAsset, TextureUploadParams};
use metrics::AssetMetricsHandle;

/// Tunables applied to every texture the manager creates
#[derive(Debug, Clone, PartialEq)]
pub struct AssetManagerConfig {
    /// Build a full mip chain when the format supports blits
    pub generate_mipmaps: bool,
    /// Upper bound on the per-texture anisotropy stored in the file
    pub max_anisotropy: f32,
}

impl Default for AssetManagerConfig {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            max_anisotropy: 16.0,
        }
    }
}

/// Entries reclaimed by one `garbage_collect` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub models: usize,
    pub materials: usize,
    pub meshes: usize,
    pub textures: usize,
}

impl GcStats {
    pub fn total(&self) -> usize {
        self.models + self.materials + self.meshes + self.textures
    }
}

struct MeshEntry<G: GpuDevice> {
    asset: MeshAsset<G>,
    path_key: Option<PathBuf>,
}

struct MaterialEntry {
    asset: MaterialAsset,
    texture_deps: Vec<TextureHandle>,
}

struct ModelEntry {
    asset: ModelAsset,
    mesh_deps: Vec<MeshHandle>,
    material_deps: Vec<MaterialHandle>,
    path_key: Option<PathBuf>,
}

/// Owns GPU and CPU assets behind generational handles
///
/// Generic over the GPU device type. Not internally synchronized: drive it
/// from one thread.
pub struct AssetManager<G: GpuDevice = crate::gpu::mock::MockGpu> {
    gpu: G,
    config: AssetManagerConfig,
    meshes: HandleTable<MeshHandle, MeshEntry<G>>,
    textures: HandleTable<TextureHandle, TextureAsset<G>>,
    materials: HandleTable<MaterialHandle, MaterialEntry>,
    models: HandleTable<ModelHandle, ModelEntry>,
    mesh_cache: PathCache<MeshHandle>,
    model_cache: PathCache<ModelHandle>,
    /// Performance metrics for asset loading and caching
    metrics: AssetMetricsHandle,
}

impl<G: GpuDevice> std::fmt::Debug for AssetManager<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("backend", &self.gpu.backend_name())
            .field("meshes", &self.meshes.len())
            .field("textures", &self.textures.len())
            .field("materials", &self.materials.len())
            .field("models", &self.models.len())
            .finish()
    }
}

/// Keyed on the path as given, hashed with xxh3
type PathCache<H> = HashMap<PathBuf, H, BuildHasherDefault<Xxh3>>;

fn debug_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl<G: GpuDevice> AssetManager<G> {
    /// Creates a manager with the default configuration
    pub fn new(gpu: G) -> Self {
        Self::with_config(gpu, AssetManagerConfig::default())
    }

    pub fn with_config(gpu: G, config: AssetManagerConfig) -> Self {
        Self {
            gpu,
            config,
            meshes: HandleTable::new(),
            textures: HandleTable::new(),
            materials: HandleTable::new(),
            models: HandleTable::new(),
            mesh_cache: PathCache::default(),
            model_cache: PathCache::default(),
            metrics: AssetMetricsHandle::new(),
        }
    }

    /// Get a reference to the GPU device
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn config(&self) -> &AssetManagerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &AssetMetricsHandle {
        &self.metrics
    }

    // ------------------------------------------------------------------
    // Entry creation
    // ------------------------------------------------------------------

    /// Take ownership of an uploaded mesh
    pub fn create_mesh(&mut self, asset: MeshAsset<G>, initial_ref: u32) -> MeshHandle {
        self.metrics.record_gpu_alloc(asset.gpu_bytes());
        self.meshes.insert(
            MeshEntry {
                asset,
                path_key: None,
            },
            initial_ref,
        )
    }

    /// Take ownership of an uploaded texture
    pub fn create_texture(&mut self, asset: TextureAsset<G>, initial_ref: u32) -> TextureHandle {
        self.metrics.record_gpu_alloc(asset.gpu_bytes());
        self.textures.insert(asset, initial_ref)
    }

    /// Store a material and take one ref on each texture slot it binds
    pub fn create_material(&mut self, asset: MaterialAsset, initial_ref: u32) -> MaterialHandle {
        let mut texture_deps = Vec::new();
        for texture in asset.texture_handles() {
            if self.textures.add_ref(texture) {
                texture_deps.push(texture);
            } else {
                log::warn!(
                    "Material '{}' binds stale texture {:?}; not tracked",
                    asset.debug_name,
                    texture
                );
            }
        }

        self.materials.insert(
            MaterialEntry {
                asset,
                texture_deps,
            },
            initial_ref,
        )
    }

    /// Store a model and take one ref per primitive on its mesh and material
    pub fn create_model(&mut self, asset: ModelAsset, initial_ref: u32) -> ModelHandle {
        let mut mesh_deps = Vec::with_capacity(asset.primitives.len());
        let mut material_deps = Vec::with_capacity(asset.primitives.len());

        for primitive in &asset.primitives {
            if self.meshes.add_ref(primitive.mesh) {
                mesh_deps.push(primitive.mesh);
            }
            if self.materials.add_ref(primitive.material) {
                material_deps.push(primitive.material);
            }
        }

        self.models.insert(
            ModelEntry {
                asset,
                mesh_deps,
                material_deps,
                path_key: None,
            },
            initial_ref,
        )
    }

    // ------------------------------------------------------------------
    // Lookup and ref counting
    // ------------------------------------------------------------------

    pub fn get_mesh(&self, handle: MeshHandle) -> Option<&MeshAsset<G>> {
        self.meshes.get(handle).map(|e| &e.asset)
    }

    pub fn get_texture(&self, handle: TextureHandle) -> Option<&TextureAsset<G>> {
        self.textures.get(handle)
    }

    pub fn get_material(&self, handle: MaterialHandle) -> Option<&MaterialAsset> {
        self.materials.get(handle).map(|e| &e.asset)
    }

    pub fn get_model(&self, handle: ModelHandle) -> Option<&ModelAsset> {
        self.models.get(handle).map(|e| &e.asset)
    }

    pub fn add_ref_mesh(&mut self, handle: MeshHandle) {
        self.meshes.add_ref(handle);
    }

    pub fn add_ref_texture(&mut self, handle: TextureHandle) {
        self.textures.add_ref(handle);
    }

    pub fn add_ref_material(&mut self, handle: MaterialHandle) {
        self.materials.add_ref(handle);
    }

    pub fn add_ref_model(&mut self, handle: ModelHandle) {
        self.models.add_ref(handle);
    }

    pub fn release_mesh(&mut self, handle: MeshHandle) {
        self.meshes.release(handle);
    }

    pub fn release_texture(&mut self, handle: TextureHandle) {
        self.textures.release(handle);
    }

    pub fn release_material(&mut self, handle: MaterialHandle) {
        self.materials.release(handle);
    }

    pub fn release_model(&mut self, handle: ModelHandle) {
        self.models.release(handle);
    }

    pub fn mesh_ref_count(&self, handle: MeshHandle) -> Option<u32> {
        self.meshes.ref_count(handle)
    }

    pub fn texture_ref_count(&self, handle: TextureHandle) -> Option<u32> {
        self.textures.ref_count(handle)
    }

    pub fn material_ref_count(&self, handle: MaterialHandle) -> Option<u32> {
        self.materials.ref_count(handle)
    }

    pub fn model_ref_count(&self, handle: ModelHandle) -> Option<u32> {
        self.models.ref_count(handle)
    }

    /// Textures a material holds refs on, one per bound slot
    pub fn material_dependencies(&self, handle: MaterialHandle) -> Option<&[TextureHandle]> {
        self.materials.get(handle).map(|e| e.texture_deps.as_slice())
    }

    /// Meshes and materials a model holds refs on, one per primitive
    pub fn model_dependencies(
        &self,
        handle: ModelHandle,
    ) -> Option<(&[MeshHandle], &[MaterialHandle])> {
        self.models
            .get(handle)
            .map(|e| (e.mesh_deps.as_slice(), e.material_deps.as_slice()))
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn textures(&self) -> impl Iterator<Item = (TextureHandle, &TextureAsset<G>)> {
        self.textures.iter()
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshHandle, &MeshAsset<G>)> {
        self.meshes.iter().map(|(h, e)| (h, &e.asset))
    }

    pub fn materials(&self) -> impl Iterator<Item = (MaterialHandle, &MaterialAsset)> {
        self.materials.iter().map(|(h, e)| (h, &e.asset))
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Load a `.smesh` file; returns the invalid handle on failure
    pub fn load_mesh<P: AsRef<Path>>(&mut self, path: P) -> MeshHandle {
        let path = path.as_ref();
        match self.try_load_mesh(path) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to load mesh {}: {e}", path.display());
                MeshHandle::INVALID
            }
        }
    }

    /// Load a `.smesh` file, or take another ref on the cached copy
    pub fn try_load_mesh<P: AsRef<Path>>(&mut self, path: P) -> Result<MeshHandle> {
        let path = path.as_ref();
        if let Some(&handle) = self.mesh_cache.get(path) {
            if self.meshes.add_ref(handle) {
                self.metrics.record_cache_hit();
                return Ok(handle);
            }
            self.mesh_cache.remove(path);
        }
        self.metrics.record_cache_miss();

        let start = Instant::now();
        let result = load_smesh_v0(path)
            .map_err(AssetError::from)
            .and_then(|data| MeshAsset::upload(&self.gpu, &data).map_err(AssetError::from));
        let mut asset = match result {
            Ok(asset) => asset,
            Err(e) => {
                self.metrics.record_load_failure();
                return Err(e);
            }
        };
        asset.debug_name = debug_name_for(path);

        self.metrics.record_gpu_alloc(asset.gpu_bytes());
        let handle = self.meshes.insert(
            MeshEntry {
                asset,
                path_key: Some(path.to_path_buf()),
            },
            1,
        );
        self.mesh_cache.insert(path.to_path_buf(), handle);

        self.metrics
            .record_load(path.display().to_string(), start.elapsed());
        log::info!("Loaded mesh {} as {:?}", path.display(), handle);
        Ok(handle)
    }

    /// Load a `.smodel` file; returns the invalid handle on failure.
    ///
    /// See [`AssetManager::try_load_model`] for the upload order and the
    /// colour-space override.
    pub fn load_model<P: AsRef<Path>>(&mut self, path: P) -> ModelHandle {
        let path = path.as_ref();
        match self.try_load_model(path) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to load model {}: {e}", path.display());
                ModelHandle::INVALID
            }
        }
    }

    /// Load a `.smodel` file, or take another ref on the cached copy.
    ///
    /// Textures are recorded into one upload context and submitted once;
    /// their entries exist only after that submission succeeded. A failure
    /// after that point leaves the entries created so far at ref count zero
    /// for the next `garbage_collect`.
    ///
    /// A texture's sRGB flag normally comes from its record's colorSpace.
    /// When every material slot sampling the texture expects the other
    /// space, that space is used instead and a warning is logged.
    pub fn try_load_model<P: AsRef<Path>>(&mut self, path: P) -> Result<ModelHandle> {
        let path = path.as_ref();
        if let Some(&handle) = self.model_cache.get(path) {
            if self.models.add_ref(handle) {
                self.metrics.record_cache_hit();
                return Ok(handle);
            }
            self.model_cache.remove(path);
        }
        self.metrics.record_cache_miss();

        let start = Instant::now();
        let handle = match self.build_model(path) {
            Ok(handle) => handle,
            Err(e) => {
                self.metrics.record_load_failure();
                return Err(e);
            }
        };

        if let Some(entry) = self.models.get_mut(handle) {
            entry.path_key = Some(path.to_path_buf());
        }
        self.model_cache.insert(path.to_path_buf(), handle);
        self.metrics
            .record_load(path.display().to_string(), start.elapsed());
        Ok(handle)
    }

    fn build_model(&mut self, path: &Path) -> Result<ModelHandle> {
        let file = SModelFile::load(path)?;

        let textures = self.upload_textures(&file)?;

        let materials: Vec<MaterialHandle> = file
            .materials()
            .iter()
            .map(|record| {
                let name = file.string(record.name_str_offset);
                let material = MaterialAsset::from_record(record, name, &textures);
                self.create_material(material, 0)
            })
            .collect();

        let mut meshes = Vec::with_capacity(file.mesh_count());
        for index in 0..file.mesh_count() {
            let data = mesh_data_from_file(&file, index);
            let mut asset = MeshAsset::upload(&self.gpu, &data)
                .map_err(|source| AssetError::MeshUpload { index, source })?;
            asset.debug_name = file.string(file.meshes()[index].name_str_offset).to_string();
            meshes.push(self.create_mesh(asset, 0));
        }

        let primitives = file
            .primitives()
            .iter()
            .map(|p| ModelPrimitive {
                mesh: meshes
                    .get(p.mesh_index as usize)
                    .copied()
                    .unwrap_or(MeshHandle::INVALID),
                material: materials
                    .get(p.material_index as usize)
                    .copied()
                    .unwrap_or(MaterialHandle::INVALID),
                first_index: p.first_index,
                index_count: p.index_count,
                vertex_offset: p.vertex_offset,
            })
            .collect();

        let model = ModelAsset {
            debug_name: debug_name_for(path),
            primitives,
            nodes: nodes_from_file(&file),
            animations: animations_from_file(&file),
        };

        log::info!(
            "Loaded model '{}' ({} meshes, {} materials, {} textures, {} primitives, {} nodes, {} clips)",
            model.debug_name,
            meshes.len(),
            materials.len(),
            textures.len(),
            model.primitives.len(),
            model.nodes.len(),
            model.animations.len()
        );

        Ok(self.create_model(model, 1))
    }

    /// Decode and record every texture into one context, submit once, and
    /// only then create the entries (ref count zero).
    fn upload_textures(&mut self, file: &SModelFile) -> Result<Vec<TextureHandle>> {
        if file.texture_count() == 0 {
            return Ok(Vec::new());
        }

        let srgb = resolve_color_spaces(file);
        let mut recorded: Vec<TextureAsset<G>> = Vec::with_capacity(file.texture_count());
        let mut ctx = UploadContext::begin(&self.gpu)?;

        for (index, record) in file.textures().iter().enumerate() {
            let mut texture = TextureAsset::new();
            texture.debug_name = file.string(record.name_str_offset).to_string();

            let params = self.texture_params(record, srgb[index]);
            let bytes = file.texture_image_bytes(index).unwrap_or_default();
            let result = texture.upload_encoded_image_deferred(
                &mut ctx,
                bytes,
                ImageEncoding::from_raw(record.encoding),
                &params,
            );
            recorded.push(texture);

            if let Err(source) = result {
                ctx.abort();
                self.destroy_recorded(recorded);
                return Err(AssetError::TextureUpload { index, source });
            }
        }

        if let Err(e) = ctx.end_submit_and_wait() {
            self.destroy_recorded(recorded);
            return Err(e.into());
        }

        Ok(recorded
            .into_iter()
            .map(|texture| self.create_texture(texture, 0))
            .collect())
    }

    fn destroy_recorded(&self, textures: Vec<TextureAsset<G>>) {
        for mut texture in textures {
            texture.destroy(&self.gpu);
        }
    }

    fn texture_params(&self, record: &TextureRecord, srgb: bool) -> TextureUploadParams {
        let max_anisotropy = record.max_anisotropy;
        TextureUploadParams {
            srgb,
            generate_mipmaps: self.config.generate_mipmaps,
            sampler: SamplerDescriptor {
                wrap_u: WrapMode::from_raw(record.wrap_u),
                wrap_v: WrapMode::from_raw(record.wrap_v),
                min_filter: FilterMode::from_raw(record.min_filter),
                mag_filter: FilterMode::from_raw(record.mag_filter),
                mipmap_mode: MipmapMode::from_raw(record.mip_filter),
                max_anisotropy: max_anisotropy.min(self.config.max_anisotropy),
                max_lod: 0.0,
            },
        }
    }

    // ------------------------------------------------------------------
    // Reclamation
    // ------------------------------------------------------------------

    /// Destroy every entry whose ref count is zero, cascading to dependencies.
    ///
    /// Running it twice in a row reclaims nothing the second time.
    pub fn garbage_collect(&mut self) -> GcStats {
        let mut stats = GcStats::default();

        for (handle, entry) in self.models.take_unreferenced() {
            for &mesh in &entry.mesh_deps {
                self.meshes.release(mesh);
            }
            for &material in &entry.material_deps {
                self.materials.release(material);
            }
            if let Some(key) = &entry.path_key {
                if self.model_cache.get(key) == Some(&handle) {
                    self.model_cache.remove(key);
                }
            }
            log::debug!("Reclaimed model '{}' {:?}", entry.asset.debug_name, handle);
            stats.models += 1;
        }

        for (_, entry) in self.materials.take_unreferenced() {
            for &texture in &entry.texture_deps {
                self.textures.release(texture);
            }
            stats.materials += 1;
        }

        for (handle, mut entry) in self.meshes.take_unreferenced() {
            self.metrics.record_gpu_free(entry.asset.gpu_bytes());
            entry.asset.destroy(&self.gpu);
            if let Some(key) = &entry.path_key {
                if self.mesh_cache.get(key) == Some(&handle) {
                    self.mesh_cache.remove(key);
                }
            }
            stats.meshes += 1;
        }

        for (_, mut texture) in self.textures.take_unreferenced() {
            self.metrics.record_gpu_free(texture.gpu_bytes());
            texture.destroy(&self.gpu);
            stats.textures += 1;
        }

        if stats.total() > 0 {
            self.metrics.record_reclaimed(stats.total() as u64);
            log::info!(
                "GC reclaimed {} models, {} materials, {} meshes, {} textures",
                stats.models,
                stats.materials,
                stats.meshes,
                stats.textures
            );
        }
        stats
    }
}

impl<G: GpuDevice> Drop for AssetManager<G> {
    fn drop(&mut self) {
        for (_, mut entry) in self.meshes.drain() {
            entry.asset.destroy(&self.gpu);
        }
        for (_, mut texture) in self.textures.drain() {
            texture.destroy(&self.gpu);
        }
        self.materials.drain();
        self.models.drain();
        self.mesh_cache.clear();
        self.model_cache.clear();
    }
}

/// CPU copy of mesh `index` of a validated file
fn mesh_data_from_file(file: &SModelFile, index: usize) -> MeshData {
    let record = file.meshes()[index];
    let format = IndexFormat::from_raw(record.index_type).unwrap_or(IndexFormat::U16);

    MeshData {
        vertex_bytes: file.mesh_vertex_bytes(index).unwrap_or_default().to_vec(),
        indices: MeshIndices::from_le_bytes(format, file.mesh_index_bytes(index).unwrap_or_default()),
        vertex_count: record.vertex_count,
        vertex_stride: record.vertex_stride,
        aabb_min: record.aabb_min,
        aabb_max: record.aabb_max,
    }
}

/// sRGB flag per texture.
///
/// The record's colorSpace wins unless every material slot sampling the
/// texture expects the other space.
fn resolve_color_spaces(file: &SModelFile) -> Vec<bool> {
    let count = file.texture_count();
    let mut srgb_slots = vec![false; count];
    let mut linear_slots = vec![false; count];

    for material in file.materials() {
        for slot in TextureSlot::ALL {
            let Some(index) = material.texture_index(slot) else {
                continue;
            };
            let index = index as usize;
            if index >= count {
                continue;
            }
            if slot.is_srgb() {
                srgb_slots[index] = true;
            } else {
                linear_slots[index] = true;
            }
        }
    }

    file.textures()
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let declared = ColorSpace::from_raw(record.color_space) == ColorSpace::Srgb;
            match (srgb_slots[i], linear_slots[i]) {
                (true, false) if !declared => {
                    log::warn!("Texture {i} is declared linear but only sampled by sRGB slots; using sRGB");
                    true
                }
                (false, true) if declared => {
                    log::warn!("Texture {i} is declared sRGB but only sampled by linear slots; using linear");
                    false
                }
                _ => declared,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::mock::MockGpu;

    fn uploaded_mesh(gpu: &MockGpu) -> MeshAsset<MockGpu> {
        let data = MeshData {
            vertex_bytes: vec![0; 36],
            indices: MeshIndices::U16(vec![0, 1, 2]),
            vertex_count: 3,
            vertex_stride: 12,
            ..Default::default()
        };
        MeshAsset::upload(gpu, &data).unwrap()
    }

    #[test]
    fn test_stale_handles_are_noops() {
        let gpu = MockGpu::new();
        let mut manager = AssetManager::new(gpu);

        let stale = MeshHandle::new(42, 1);
        manager.add_ref_mesh(stale);
        manager.release_mesh(stale);
        assert!(manager.get_mesh(stale).is_none());
        assert!(manager.get_model(ModelHandle::INVALID).is_none());
        assert_eq!(manager.mesh_ref_count(stale), None);
    }

    #[test]
    fn test_model_refs_cascade_through_gc() {
        let gpu = MockGpu::new();
        let mut manager = AssetManager::new(gpu.clone());

        let mesh = manager.create_mesh(uploaded_mesh(&gpu), 0);
        let material = manager.create_material(MaterialAsset::default(), 0);
        let primitive = ModelPrimitive {
            mesh,
            material,
            first_index: 0,
            index_count: 3,
            vertex_offset: 0,
        };
        let model = manager.create_model(
            ModelAsset {
                primitives: vec![primitive, primitive],
                ..Default::default()
            },
            1,
        );

        assert_eq!(manager.mesh_ref_count(mesh), Some(2));
        assert_eq!(manager.material_ref_count(material), Some(2));
        assert_eq!(manager.garbage_collect(), GcStats::default());

        manager.release_model(model);
        let stats = manager.garbage_collect();
        assert_eq!(stats.models, 1);
        assert_eq!(stats.materials, 1);
        assert_eq!(stats.meshes, 1);
        assert_eq!(manager.mesh_count(), 0);
        assert_eq!(gpu.live_resource_count(), 0);
        assert_eq!(manager.metrics().gpu_bytes_resident(), 0);

        assert_eq!(manager.garbage_collect().total(), 0);
    }

    #[test]
    fn test_material_tracks_each_bound_slot() {
        let gpu = MockGpu::new();
        let mut manager = AssetManager::new(gpu);

        let texture = manager.create_texture(TextureAsset::new(), 0);
        let mut material = MaterialAsset::default();
        material.set_texture(TextureSlot::BaseColor, Some(texture));
        material.set_texture(TextureSlot::Emissive, Some(texture));
        let handle = manager.create_material(material, 1);

        assert_eq!(manager.texture_ref_count(texture), Some(2));
        assert_eq!(manager.material_dependencies(handle), Some(&[texture, texture][..]));

        manager.release_material(handle);
        manager.garbage_collect();
        assert_eq!(manager.texture_count(), 0);
    }

    #[test]
    fn test_drop_destroys_gpu_resources() {
        let gpu = MockGpu::new();
        {
            let mut manager = AssetManager::new(gpu.clone());
            manager.create_mesh(uploaded_mesh(&gpu), 5);
            assert!(gpu.live_buffer_count() > 0);
        }
        assert_eq!(gpu.live_resource_count(), 0);
    }

    #[test]
    fn test_path_cache_keys_on_full_path() {
        let dir = tempfile::tempdir().unwrap();
        let data = MeshData {
            vertex_bytes: vec![0; 36],
            indices: MeshIndices::U16(vec![0, 1, 2]),
            vertex_count: 3,
            vertex_stride: 12,
            ..Default::default()
        };
        let a = dir.path().join("a.smesh");
        let b = dir.path().join("b.smesh");
        std::fs::write(&a, crate::loader::write_smesh_v0(&data)).unwrap();
        std::fs::write(&b, crate::loader::write_smesh_v0(&data)).unwrap();

        let mut manager = AssetManager::new(MockGpu::new());
        let mesh_a = manager.load_mesh(&a);
        let mesh_b = manager.load_mesh(&b);
        assert_ne!(mesh_a, mesh_b);
        assert_eq!(manager.mesh_cache.get(&a), Some(&mesh_a));
        assert_eq!(manager.mesh_cache.get(&b), Some(&mesh_b));
        assert_eq!(manager.load_mesh(&a), mesh_a);

        manager.release_mesh(mesh_a);
        manager.release_mesh(mesh_a);
        manager.garbage_collect();
        assert!(!manager.mesh_cache.contains_key(&a));
        assert_eq!(manager.mesh_cache.get(&b), Some(&mesh_b));
    }

    #[test]
    fn test_missing_files_return_invalid_handles() {
        let mut manager = AssetManager::new(MockGpu::new());
        assert!(!manager.load_model("/nonexistent/model.smodel").is_valid());
        assert!(!manager.load_mesh("/nonexistent/mesh.smesh").is_valid());
        assert_eq!(manager.metrics().load_failures(), 2);
        assert!(matches!(
            manager.try_load_model("/nonexistent/model.smodel"),
            Err(AssetError::SModel(_))
        ));
    }
}
