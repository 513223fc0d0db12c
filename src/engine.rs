//! Bake engine seam.
//!
//! The renderer that actually computes emitted radiance is an opaque external
//! collaborator; the orchestrator only ever talks to it through
//! [`BakeEngine`] and treats any failure uniformly. The built-in CPU engine
//! lives in [`crate::raster`].

use std::collections::BTreeMap;

use image::RgbaImage;

use crate::document::{Material, Mesh};
use crate::error::BakeError;

/// Quality and layout knobs for one bake. Higher sample counts reduce
/// variance at proportional cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeSettings {
    /// Baked textures are square, `resolution` x `resolution`.
    pub resolution: u32,
    /// Jittered sub-texel samples per texel.
    pub samples: u32,
    /// Texels of dilation past UV island borders, so minification does not
    /// bleed background into seams.
    pub margin: u32,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            resolution: 1024,
            samples: 128,
            margin: 4,
        }
    }
}

/// Capability interface over the render collaborator.
///
/// `bake_emission` evaluates the material's shading network in emission-only
/// mode (every non-emissive term zeroed) at each UV-covered texel of the
/// mesh and returns the resulting square pixel buffer. Device selection is
/// the engine's own policy.
pub trait BakeEngine: Send + Sync {
    fn bake_emission(
        &self,
        mesh: &Mesh,
        material: &Material,
        scene_images: &BTreeMap<String, RgbaImage>,
        settings: &BakeSettings,
    ) -> Result<RgbaImage, BakeError>;
}
