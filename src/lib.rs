//! smod_asset - Cooked-model asset runtime
//!
//! # Features
//! - Zero-copy, fully validated `.smodel` loading (V1 meshes and materials,
//!   V2 node hierarchy, V3 animation clips)
//! - GPU abstraction (Vulkan via trait, mock for tests)
//! - Batched texture uploads with mipmap generation
//! - Ref-counted assets behind generational handles with cascaded GC
//!
//! # Quick Start
//!
//! ```ignore
//! use smod_asset::{AssetManager, MockGpu};
//!
//! let mut assets = AssetManager::new(MockGpu::new());
//! let model = assets.load_model("helmet.smodel");
//! // ... render ...
//! assets.release_model(model);
//! assets.garbage_collect();
//! ```
//!
//! # Feature Flags
//!
//! - `gpu-vulkan`: Enable the Vulkan GPU backend (ash + vk-mem)

// Core modules
pub mod gpu;
pub mod handle;
pub mod loader;
pub mod manager;

// Asset modules
pub mod mesh;
pub mod model;
pub mod texture;

// Error types
mod error;
pub use error::{AssetError, Result};

// Re-export manager types
pub use manager::metrics::{AssetMetrics, AssetMetricsHandle};
pub use manager::{AssetManager, AssetManagerConfig, GcStats};

// Re-export handle types
pub use handle::{AssetHandle, MaterialHandle, MeshHandle, ModelHandle, TextureHandle};

// Re-export GPU types
pub use gpu::mock::MockGpu;
#[cfg(feature = "gpu-vulkan")]
pub use gpu::vulkan::VulkanDevice;
pub use gpu::{
    BufferUsage, FilterMode, GpuDevice, GpuError, GpuResult, GpuTextureFormat, ImageLayout,
    MipmapMode, SamplerDescriptor, TextureDescriptor, UploadContext, WrapMode,
};

// Re-export loader types
pub use loader::{
    load_smesh_v0, AlphaMode, ColorSpace, ConsistencyError, FormatError, ImageEncoding,
    IndexFormat, SMeshError, SModelError, SModelFile, SModelHeader, TextureSlot,
};

// Re-export asset types
pub use mesh::{MeshAsset, MeshData, MeshIndices};
pub use model::{
    AnimationChannel, AnimationClip, AnimationSampler, MaterialAsset, ModelAsset, ModelNode,
    ModelPrimitive, Transform,
};
pub use texture::{decode_rgba8, TextureAsset, TextureError, TextureUploadParams};

// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
