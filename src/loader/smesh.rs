//! `.smesh` V0 reader
//!
//! A single mesh: a 48-byte header followed by the vertex bytes and the
//! index bytes, nothing else.

use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use super::records::IndexFormat;
use crate::mesh::{MeshData, MeshIndices};

/// 'S' 'M' 'S' 'H' read as a little-endian u32
pub const SMESH_MAGIC: u32 = 0x4853_4D53;
pub const SMESH_VERSION: u32 = 0;

#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SMeshHeaderV0 {
    pub magic: u32,
    pub version: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u32,
    /// 0 = u16, 1 = u32
    pub index_format: u32,
    pub aabb_min: [f32; 3],
    pub aabb_max: [f32; 3],
}

pub const SMESH_HEADER_SIZE: usize = std::mem::size_of::<SMeshHeaderV0>();
const _: () = assert!(SMESH_HEADER_SIZE == 48);

#[derive(Error, Debug)]
pub enum SMeshError {
    #[error("Failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File too small to contain SMesh header ({0} bytes)")]
    TooSmall(usize),

    #[error("Bad SMesh magic {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported SMesh version {0}")]
    UnsupportedVersion(u32),

    #[error("SMesh has unknown indexFormat {0}")]
    InvalidIndexFormat(u32),

    #[error("SMesh has invalid vertexCount/vertexStride ({vertex_count} x {vertex_stride})")]
    InvalidLayout { vertex_count: u32, vertex_stride: u32 },

    #[error("SMesh size mismatch (expected={expected}, actual={actual})")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Read a `.smesh` file into CPU mesh data
pub fn load_smesh_v0<P: AsRef<Path>>(path: P) -> Result<MeshData, SMeshError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| SMeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_smesh_v0(&bytes)
}

pub fn parse_smesh_v0(bytes: &[u8]) -> Result<MeshData, SMeshError> {
    if bytes.len() < SMESH_HEADER_SIZE {
        return Err(SMeshError::TooSmall(bytes.len()));
    }

    let header: SMeshHeaderV0 = bytemuck::pod_read_unaligned(&bytes[..SMESH_HEADER_SIZE]);
    let magic = header.magic;
    let version = header.version;
    let vertex_count = header.vertex_count;
    let vertex_stride = header.vertex_stride;
    let index_count = header.index_count;
    let index_format = header.index_format;

    if magic != SMESH_MAGIC {
        return Err(SMeshError::BadMagic(magic));
    }
    if version != SMESH_VERSION {
        return Err(SMeshError::UnsupportedVersion(version));
    }
    let format =
        IndexFormat::from_raw(index_format).ok_or(SMeshError::InvalidIndexFormat(index_format))?;
    if vertex_count == 0 || vertex_stride == 0 {
        return Err(SMeshError::InvalidLayout {
            vertex_count,
            vertex_stride,
        });
    }

    let vertex_size = u64::from(vertex_count) * u64::from(vertex_stride);
    let index_size = u64::from(index_count) * format.size_bytes();
    let expected = SMESH_HEADER_SIZE as u64 + vertex_size + index_size;
    if bytes.len() as u64 != expected {
        return Err(SMeshError::SizeMismatch {
            expected,
            actual: bytes.len() as u64,
        });
    }

    let vertex_end = SMESH_HEADER_SIZE + vertex_size as usize;
    Ok(MeshData {
        vertex_bytes: bytes[SMESH_HEADER_SIZE..vertex_end].to_vec(),
        indices: MeshIndices::from_le_bytes(format, &bytes[vertex_end..]),
        vertex_count,
        vertex_stride,
        aabb_min: header.aabb_min,
        aabb_max: header.aabb_max,
    })
}

/// Serialize mesh data as `.smesh` V0
pub fn write_smesh_v0(mesh: &MeshData) -> Vec<u8> {
    let header = SMeshHeaderV0 {
        magic: SMESH_MAGIC,
        version: SMESH_VERSION,
        vertex_count: mesh.vertex_count,
        index_count: mesh.index_count(),
        vertex_stride: mesh.vertex_stride,
        index_format: mesh.index_format() as u32,
        aabb_min: mesh.aabb_min,
        aabb_max: mesh.aabb_max,
    };

    let mut out = Vec::with_capacity(SMESH_HEADER_SIZE + mesh.vertex_bytes.len());
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(&mesh.vertex_bytes);
    out.extend_from_slice(&mesh.indices.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        MeshData {
            vertex_bytes: vec![7u8; 3 * 12],
            indices: MeshIndices::U16(vec![0, 1, 2]),
            vertex_count: 3,
            vertex_stride: 12,
            aabb_min: [-1.0, -1.0, 0.0],
            aabb_max: [1.0, 1.0, 0.0],
        }
    }

    #[test]
    fn test_magic_spells_smsh() {
        assert_eq!(&SMESH_MAGIC.to_le_bytes(), b"SMSH");
    }

    #[test]
    fn test_written_mesh_parses_back() {
        let mesh = triangle();
        let bytes = write_smesh_v0(&mesh);
        assert_eq!(bytes.len(), 48 + 36 + 6);
        assert_eq!(parse_smesh_v0(&bytes).unwrap(), mesh);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = write_smesh_v0(&triangle());
        bytes.push(0);
        assert!(matches!(
            parse_smesh_v0(&bytes),
            Err(SMeshError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_index_format_rejected() {
        let mut bytes = write_smesh_v0(&triangle());
        bytes[20..24].copy_from_slice(&5u32.to_le_bytes());
        assert!(matches!(
            parse_smesh_v0(&bytes),
            Err(SMeshError::InvalidIndexFormat(5))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_smesh_v0("/nonexistent/mesh.smesh").unwrap_err();
        assert!(matches!(err, SMeshError::Io { .. }));
    }
}
