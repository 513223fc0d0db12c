//! The bake-and-rewire pipeline: classify emissive materials, provision UVs,
//! bake emission through the engine seam, and atomically rewire each graph to
//! sample its baked texture.

mod bake;
mod classify;
mod rewire;
mod run;

pub use bake::bake_material;
pub use classify::classify;
pub use rewire::rewire;
pub use run::{MaterialFailure, Pipeline, PipelineOptions, PipelineResult, PipelineState};
