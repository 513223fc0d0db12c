//! UV provisioning: make sure a mesh has a usable parameterization before it
//! is baked.
//!
//! The unwrap algorithm itself sits behind the `Unwrapper` seam; the built-in
//! `SmartProject` is a box projection (faces binned by dominant normal axis,
//! one island per axis, packed on a grid with a margin between islands).

use crate::document::{Mesh, UvLayer};
use crate::error::UnwrapError;

/// Faces whose normal deviates more than this from every projection axis go
/// to the fallback island.
pub const ANGLE_THRESHOLD_DEG: f32 = 66.0;
/// Spacing kept between packed islands, in UV units.
pub const ISLAND_MARGIN: f32 = 0.02;

pub trait Unwrapper {
    fn unwrap(
        &self,
        mesh: &Mesh,
        angle_threshold_deg: f32,
        island_margin: f32,
    ) -> Result<UvLayer, UnwrapError>;
}

/// Attach a UV layer to `mesh` if it has none, using the fixed unwrap
/// parameters. Returns whether a new layer was generated; a mesh that
/// already has one is left untouched.
pub fn ensure_uv(mesh: &mut Mesh, unwrapper: &dyn Unwrapper) -> Result<bool, UnwrapError> {
    if mesh.uv.is_some() {
        return Ok(false);
    }
    let layer = unwrapper.unwrap(mesh, ANGLE_THRESHOLD_DEG, ISLAND_MARGIN)?;
    if layer.per_corner.len() != mesh.corner_count() {
        return Err(UnwrapError::Degenerate(format!(
            "unwrap produced {} corners, mesh has {}",
            layer.per_corner.len(),
            mesh.corner_count()
        )));
    }
    mesh.uv = Some(layer);
    Ok(true)
}

/// Box-projection unwrapper: six axis-aligned islands plus a fallback for
/// steep faces, each normalized and packed into a grid cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartProject;

// Bin layout: axis * 2 + (0 for +, 1 for -), 6 = fallback for steep or
// degenerate faces.
const BIN_FALLBACK: usize = 6;
const BIN_COUNT: usize = 7;

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn face_bin(normal: [f32; 3], cos_threshold: f32) -> usize {
    let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if len <= f32::EPSILON {
        return BIN_FALLBACK;
    }
    let (axis, component) = normal
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, c)| (i, *c))
        .expect("normal has three components");
    if component.abs() / len < cos_threshold {
        return BIN_FALLBACK;
    }
    axis * 2 + usize::from(component < 0.0)
}

/// Planar projection for a bin: drop its axis, flip U for negative-facing
/// bins so islands are not mirrored.
fn project(bin: usize, p: [f32; 3]) -> [f32; 2] {
    let (axis, negative) = if bin == BIN_FALLBACK {
        (2, false)
    } else {
        (bin / 2, bin % 2 == 1)
    };
    let (u, v) = match axis {
        0 => (p[1], p[2]),
        1 => (p[0], p[2]),
        _ => (p[0], p[1]),
    };
    [if negative { -u } else { u }, v]
}

impl Unwrapper for SmartProject {
    fn unwrap(
        &self,
        mesh: &Mesh,
        angle_threshold_deg: f32,
        island_margin: f32,
    ) -> Result<UvLayer, UnwrapError> {
        if mesh.triangles.is_empty() {
            return Err(UnwrapError::EmptyMesh);
        }
        let cos_threshold = angle_threshold_deg.to_radians().cos();

        // First pass: bin every face and project its corners raw.
        let mut faces: Vec<(usize, [[f32; 2]; 3])> = Vec::with_capacity(mesh.triangles.len());
        let mut bounds: [Option<([f32; 2], [f32; 2])>; BIN_COUNT] = [None; BIN_COUNT];
        for tri in &mesh.triangles {
            let mut corners = [[0.0f32; 3]; 3];
            for (slot, &index) in corners.iter_mut().zip(tri.iter()) {
                *slot = *mesh
                    .positions
                    .get(index as usize)
                    .ok_or_else(|| {
                        UnwrapError::Degenerate(format!(
                            "triangle references vertex {index} of {}",
                            mesh.positions.len()
                        ))
                    })?;
            }
            let normal = cross(sub(corners[1], corners[0]), sub(corners[2], corners[0]));
            let bin = face_bin(normal, cos_threshold);
            let projected = [
                project(bin, corners[0]),
                project(bin, corners[1]),
                project(bin, corners[2]),
            ];
            let (min, max) = bounds[bin].get_or_insert((projected[0], projected[0]));
            for uv in &projected {
                min[0] = min[0].min(uv[0]);
                min[1] = min[1].min(uv[1]);
                max[0] = max[0].max(uv[0]);
                max[1] = max[1].max(uv[1]);
            }
            faces.push((bin, projected));
        }

        // Assign each populated bin a grid cell.
        let islands: Vec<usize> = (0..BIN_COUNT).filter(|b| bounds[*b].is_some()).collect();
        let cols = (islands.len() as f32).sqrt().ceil().max(1.0) as usize;
        let cell = 1.0 / cols as f32;
        let margin = island_margin.clamp(0.0, cell * 0.25);
        let inner = cell - 2.0 * margin;

        let mut cell_origin = [[0.0f32; 2]; BIN_COUNT];
        let mut cell_scale = [0.0f32; BIN_COUNT];
        for (island, &bin) in islands.iter().enumerate() {
            let (min, max) = bounds[bin].expect("islands are populated bins");
            let extent = (max[0] - min[0]).max(max[1] - min[1]).max(f32::EPSILON);
            cell_origin[bin] = [
                (island % cols) as f32 * cell + margin,
                (island / cols) as f32 * cell + margin,
            ];
            cell_scale[bin] = inner / extent;
        }

        // Second pass: normalize into the assigned cells.
        let mut per_corner = Vec::with_capacity(mesh.corner_count());
        for (bin, projected) in faces {
            let (min, _) = bounds[bin].expect("face bins were populated");
            let origin = cell_origin[bin];
            let scale = cell_scale[bin];
            for uv in projected {
                per_corner.push([
                    origin[0] + (uv[0] - min[0]) * scale,
                    origin[1] + (uv[1] - min[1]) * scale,
                ]);
            }
        }

        Ok(UvLayer { per_corner })
    }
}
