//! Loader module for cooked asset formats
//!
//! Contains the SMOD record layouts, the validating `.smodel` view and the
//! `.smesh` reader.

pub mod records;
pub mod smesh;
pub mod smodel;

// Re-export common types
pub use records::*;
pub use smesh::{load_smesh_v0, parse_smesh_v0, write_smesh_v0, SMeshError};
pub use smodel::{ConsistencyError, FormatError, SModelError, SModelFile, SModelHeader, ScalarTable};
