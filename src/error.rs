//! Failure taxonomy for the bake pipeline.
//!
//! Every failure is scoped: unwrap failures are mesh-level, bake and rewire
//! failures are material-level, import/export failures are document-level.
//! Nothing here is allowed to escape its owning scope; the controllers record
//! these values and keep going.

use std::path::PathBuf;

use thiserror::Error;

/// Mesh-level failure while generating a UV parameterization.
///
/// Clone is required: one unwrap failure annotates the record of every
/// emissive material that had to be skipped on that mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnwrapError {
    #[error("mesh has no triangles to unwrap")]
    EmptyMesh,
    #[error("mesh geometry is degenerate: {0}")]
    Degenerate(String),
}

/// Material-level failure reported by the bake orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BakeError {
    #[error("bake engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("bake engine compute error: {0}")]
    Compute(String),
    #[error("invalid bake resolution: {0}")]
    InvalidResolution(u32),
}

/// Material-level failure while rewiring a shader graph.
///
/// A rewire failure commits nothing: the material's graph is left exactly as
/// it was before the attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RewireError {
    #[error("material has no surface output node")]
    MissingOutput,
    #[error("staged graph edit failed validation: {0}")]
    Inconsistent(String),
}

/// Which pipeline stage a recorded material failure came from.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("unwrap failed: {0}")]
    Unwrap(#[from] UnwrapError),
    #[error("bake failed: {0}")]
    Bake(#[from] BakeError),
    #[error("rewire failed: {0}")]
    Rewire(#[from] RewireError),
}

/// Document-level failure in the batch controller. Isolated per document:
/// the batch records it and moves on to the next input.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to import {path}: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to export {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
