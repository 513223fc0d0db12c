//! Bake orchestration for one (mesh, material) pair.

use std::collections::{BTreeMap, HashSet};

use image::RgbaImage;
use log::info;

use crate::document::{Material, Mesh};
use crate::engine::{BakeEngine, BakeSettings};
use crate::error::BakeError;
use crate::texture_store::{BakeKey, TextureStore};

/// Drive the bake engine for one (mesh, material) pair and park the result in
/// the texture store under a name derived from the material
/// (`{material}_emission_baked`, uniquified on collision). Returns the name
/// actually allocated.
///
/// Preconditions: the mesh has a UV layer and the material classified
/// emissive. An invalid resolution is rejected before the engine is invoked.
/// On any failure nothing is inserted and the error is returned to the
/// caller; this function never retries and never touches sibling work.
pub fn bake_material(
    engine: &dyn BakeEngine,
    store: &TextureStore,
    key: BakeKey,
    mesh: &Mesh,
    material: &Material,
    scene_images: &BTreeMap<String, RgbaImage>,
    settings: &BakeSettings,
) -> Result<String, BakeError> {
    if settings.resolution == 0 {
        return Err(BakeError::InvalidResolution(settings.resolution));
    }
    if !mesh.has_uv() {
        return Err(BakeError::Compute(format!(
            "mesh '{}' has no uv layer",
            mesh.name
        )));
    }

    let pixels = engine.bake_emission(mesh, material, scene_images, settings)?;
    if pixels.width() != settings.resolution || pixels.height() != settings.resolution {
        return Err(BakeError::Compute(format!(
            "engine returned a {}x{} buffer for resolution {}",
            pixels.width(),
            pixels.height(),
            settings.resolution
        )));
    }

    // Names already committed to the scene stay reserved, so the same
    // material baked against a later mesh gets a suffixed name instead of
    // overwriting the earlier bake.
    let reserved: HashSet<String> = scene_images.keys().cloned().collect();
    let name = store.insert(
        key,
        &format!("{}_emission_baked", material.name),
        &reserved,
        pixels,
    );
    info!(
        "baked material '{}' on mesh '{}' into '{name}'",
        material.name, mesh.name
    );
    Ok(name)
}
