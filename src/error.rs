//! Error types for smod_asset

use thiserror::Error;

use crate::gpu::GpuError;
use crate::loader::{SMeshError, SModelError};
use crate::texture::TextureError;

/// Main error type for asset operations
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("SModel error: {0}")]
    SModel(#[from] SModelError),

    #[error("SMesh error: {0}")]
    SMesh(#[from] SMeshError),

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("Texture {index} upload failed: {source}")]
    TextureUpload {
        index: usize,
        #[source]
        source: TextureError,
    },

    #[error("Mesh {index} upload failed: {source}")]
    MeshUpload {
        index: usize,
        #[source]
        source: GpuError,
    },

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Result type alias for asset operations
pub type Result<T> = std::result::Result<T, AssetError>;
