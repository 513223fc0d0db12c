//! Scene document model.
//!
//! A `Scene` owns its tables outright: meshes reference materials by index
//! (`MaterialId`), so a material can be shared between meshes without
//! interior mutability, and every pipeline operation names the scene, mesh,
//! or material it acts on. Decoded image datablocks live in `Scene::images`
//! keyed by name; the document codec is responsible for encoding them in and
//! out of the container.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::graph::ShaderGraph;

/// Index into `Scene::materials`.
pub type MaterialId = usize;

/// Per-mesh UV parameterization, one coordinate per triangle corner
/// (`3 * triangles.len()` entries) so generated islands can introduce seams
/// without re-indexing vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UvLayer {
    pub per_corner: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<[f32; 3]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<[f32; 4]>>,
    pub triangles: Vec<[u32; 3]>,
    /// Material slots; a mesh may reference the same material several times
    /// and several meshes may reference the same material.
    #[serde(default)]
    pub slots: Vec<MaterialId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv: Option<UvLayer>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positions: Vec::new(),
            normals: None,
            colors: None,
            triangles: Vec::new(),
            slots: Vec::new(),
            uv: None,
        }
    }

    /// Slot materials deduplicated in first-appearance order.
    pub fn distinct_materials(&self) -> Vec<MaterialId> {
        let mut seen: Vec<MaterialId> = Vec::new();
        for &m in &self.slots {
            if !seen.contains(&m) {
                seen.push(m);
            }
        }
        seen
    }

    pub fn corner_count(&self) -> usize {
        self.triangles.len() * 3
    }

    pub fn has_uv(&self) -> bool {
        self.uv.is_some()
    }
}

/// Named owner of a shader graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub graph: ShaderGraph,
}

impl Material {
    pub fn new(name: impl Into<String>, graph: ShaderGraph) -> Self {
        Self {
            name: name.into(),
            graph,
        }
    }
}

/// Light definition. The pipeline never touches lights; they ride through
/// import and export so the baked document keeps its lighting rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    pub name: String,
    pub color: [f32; 3],
    pub energy: f32,
    pub position: [f32; 3],
}

/// An imported scene document. Owned by the caller for the duration of a
/// pipeline run; the pipeline reads and mutates it in place and never
/// creates or destroys scenes.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub name: String,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
    /// Decoded image datablocks by name. Baked textures land here once the
    /// rewire step consumes them, so the exporter can embed them.
    pub images: BTreeMap<String, RgbaImage>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Cross-table consistency: slots point at existing materials, optional
    /// per-vertex attributes match the position count, and a UV layer covers
    /// every triangle corner.
    pub fn validate_refs(&self) -> Result<()> {
        for mesh in &self.meshes {
            for &slot in &mesh.slots {
                if slot >= self.materials.len() {
                    bail!(
                        "mesh '{}' references missing material slot {}",
                        mesh.name,
                        slot
                    );
                }
            }
            if let Some(normals) = &mesh.normals {
                if normals.len() != mesh.positions.len() {
                    bail!("mesh '{}' normal count mismatch", mesh.name);
                }
            }
            if let Some(colors) = &mesh.colors {
                if colors.len() != mesh.positions.len() {
                    bail!("mesh '{}' vertex color count mismatch", mesh.name);
                }
            }
            if let Some(uv) = &mesh.uv {
                if uv.per_corner.len() != mesh.corner_count() {
                    bail!(
                        "mesh '{}' uv layer covers {} corners, expected {}",
                        mesh.name,
                        uv.per_corner.len(),
                        mesh.corner_count()
                    );
                }
            }
        }
        Ok(())
    }
}
