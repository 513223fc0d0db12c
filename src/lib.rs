//! emberbake: bake procedural emission into textures and rewire shader
//! graphs to sample them.
//!
//! The pipeline classifies which materials of a scene contribute emission,
//! guarantees each affected mesh a UV parameterization, rasterizes the
//! emission-only signal into a texture through the bake engine seam, and
//! atomically rewrites each graph so the baked texture drives the surface
//! output. The batch layer applies that pipeline across scene bundle
//! documents, isolating per-document failures.

pub mod batch;
pub mod codec;
pub mod document;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod raster;
pub mod texture_store;
pub mod unwrap;
