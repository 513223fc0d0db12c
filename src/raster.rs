//! Built-in CPU bake engine.
//!
//! Rasterizes the emission-only signal of a material into a square texture by
//! scan-converting the mesh's UV triangles: every texel covered by an island
//! is supersampled with jittered sub-texel positions, the shading network is
//! evaluated in emission-only mode at each sample, and covered borders are
//! dilated outward by the configured margin so minification does not pull
//! background color across seams.

use std::collections::BTreeMap;

use image::{Rgba, RgbaImage};
use log::debug;

use crate::document::{Material, Mesh};
use crate::engine::{BakeEngine, BakeSettings};
use crate::error::BakeError;
use crate::graph::{ImageRef, Node, NodeId, NodeKind, ShaderGraph, socket};

#[derive(Debug, Clone, Copy, Default)]
pub struct EmissionRasterizer;

impl BakeEngine for EmissionRasterizer {
    fn bake_emission(
        &self,
        mesh: &Mesh,
        material: &Material,
        scene_images: &BTreeMap<String, RgbaImage>,
        settings: &BakeSettings,
    ) -> Result<RgbaImage, BakeError> {
        if settings.resolution == 0 {
            return Err(BakeError::InvalidResolution(settings.resolution));
        }
        let uv = mesh
            .uv
            .as_ref()
            .ok_or_else(|| BakeError::Compute(format!("mesh '{}' has no uv layer", mesh.name)))?;
        if uv.per_corner.len() != mesh.corner_count() {
            return Err(BakeError::Compute(format!(
                "mesh '{}' uv layer is incomplete",
                mesh.name
            )));
        }

        let eval = EmissionEval::new(&material.graph, scene_images)?;
        let res = settings.resolution;
        let samples = settings.samples.max(1);

        let size = (res * res) as usize;
        let mut accum: Vec<[f32; 3]> = vec![[0.0; 3]; size];
        let mut hits: Vec<u32> = vec![0; size];

        for (face, _) in mesh.triangles.iter().enumerate() {
            let corners = [
                uv.per_corner[face * 3],
                uv.per_corner[face * 3 + 1],
                uv.per_corner[face * 3 + 2],
            ];
            rasterize_triangle(&corners, res, samples, |x, y, sample_uv| {
                let e = eval.emission_at(sample_uv);
                let texel = &mut accum[(y * res + x) as usize];
                texel[0] += e[0];
                texel[1] += e[1];
                texel[2] += e[2];
                hits[(y * res + x) as usize] += 1;
            });
        }

        let mut out = RgbaImage::new(res, res);
        for y in 0..res {
            for x in 0..res {
                let i = (y * res + x) as usize;
                if hits[i] > 0 {
                    let n = hits[i] as f32;
                    out.put_pixel(
                        x,
                        y,
                        Rgba([
                            to_u8(accum[i][0] / n),
                            to_u8(accum[i][1] / n),
                            to_u8(accum[i][2] / n),
                            255,
                        ]),
                    );
                }
            }
        }

        dilate(&mut out, settings.margin);
        debug!(
            "baked '{}' for mesh '{}' at {res}x{res}, {samples} samples/texel",
            material.name, mesh.name
        );
        Ok(out)
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Visit every jittered sample of every texel the triangle's UV bounding box
/// touches; `emit` is called only for samples inside the triangle, with the
/// texel coordinates and the sample position in UV space.
fn rasterize_triangle(
    corners: &[[f32; 2]; 3],
    res: u32,
    samples: u32,
    mut emit: impl FnMut(u32, u32, [f32; 2]),
) {
    let fres = res as f32;
    let a = [corners[0][0] * fres, corners[0][1] * fres];
    let b = [corners[1][0] * fres, corners[1][1] * fres];
    let c = [corners[2][0] * fres, corners[2][1] * fres];

    let area = edge(a, b, c);
    if area.abs() <= f32::EPSILON {
        return;
    }

    let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as u32;
    let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as u32;
    let max_x = (a[0].max(b[0]).max(c[0]).ceil() as u32).min(res);
    let max_y = (a[1].max(b[1]).max(c[1]).ceil() as u32).min(res);

    for y in min_y..max_y {
        for x in min_x..max_x {
            for s in 0..samples {
                let j = jitter(x, y, s);
                let p = [x as f32 + j[0], y as f32 + j[1]];
                if inside(p, a, b, c, area) {
                    emit(x, y, [p[0] / fres, p[1] / fres]);
                }
            }
        }
    }
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn inside(p: [f32; 2], a: [f32; 2], b: [f32; 2], c: [f32; 2], area: f32) -> bool {
    let w0 = edge(a, b, p) / area;
    let w1 = edge(b, c, p) / area;
    let w2 = edge(c, a, p) / area;
    w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
}

/// Deterministic sub-texel jitter in [0, 1) x [0, 1), seeded by texel and
/// sample index.
fn jitter(x: u32, y: u32, s: u32) -> [f32; 2] {
    let mut h = x
        .wrapping_mul(0x9E37_79B9)
        .wrapping_add(y.wrapping_mul(0x85EB_CA6B))
        .wrapping_add(s.wrapping_mul(0xC2B2_AE35));
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    [
        (h & 0xFFFF) as f32 / 65536.0,
        (h >> 16) as f32 / 65536.0,
    ]
}

/// Grow covered regions outward by `margin` texels; each pass fills every
/// uncovered texel that touches a covered one with the average of its covered
/// neighbors.
fn dilate(image: &mut RgbaImage, margin: u32) {
    let (w, h) = image.dimensions();
    for _ in 0..margin {
        let snapshot = image.clone();
        for y in 0..h {
            for x in 0..w {
                if snapshot.get_pixel(x, y)[3] != 0 {
                    continue;
                }
                let mut sum = [0u32; 3];
                let mut count = 0u32;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let p = snapshot.get_pixel(nx as u32, ny as u32);
                        if p[3] != 0 {
                            sum[0] += p[0] as u32;
                            sum[1] += p[1] as u32;
                            sum[2] += p[2] as u32;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    image.put_pixel(
                        x,
                        y,
                        Rgba([
                            (sum[0] / count) as u8,
                            (sum[1] / count) as u8,
                            (sum[2] / count) as u8,
                            255,
                        ]),
                    );
                }
            }
        }
    }
}

/// One emitting node's contribution: a constant color or an image lookup,
/// times a constant strength.
enum EmitterColor<'a> {
    Constant([f32; 4]),
    Image(&'a RgbaImage),
}

struct Emitter<'a> {
    color: EmitterColor<'a>,
    strength: f32,
}

/// Emission-only evaluation of a shader graph: every Emission node and every
/// Principled emission term reachable from the surface output contributes;
/// all non-emissive terms are zero by construction.
struct EmissionEval<'a> {
    emitters: Vec<Emitter<'a>>,
}

impl<'a> EmissionEval<'a> {
    fn new(
        graph: &'a ShaderGraph,
        scene_images: &'a BTreeMap<String, RgbaImage>,
    ) -> Result<Self, BakeError> {
        let Some(output) = graph.surface_output() else {
            return Err(BakeError::Compute(
                "material has no surface output node".to_string(),
            ));
        };
        let reachable = graph.upstream_reachable(output);

        let mut emitters = Vec::new();
        for node in graph.nodes().filter(|n| reachable.contains(&n.id)) {
            match &node.kind {
                NodeKind::Emission { color, strength } => {
                    emitters.push(Emitter {
                        color: resolve_color(
                            graph,
                            scene_images,
                            node.id,
                            socket::COLOR,
                            *color,
                        )?,
                        strength: *strength,
                    });
                }
                NodeKind::Principled {
                    emission_color,
                    emission_strength,
                    ..
                } => {
                    if *emission_strength > 0.0 {
                        emitters.push(Emitter {
                            color: resolve_color(
                                graph,
                                scene_images,
                                node.id,
                                socket::EMISSION_COLOR,
                                *emission_color,
                            )?,
                            strength: *emission_strength,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(Self { emitters })
    }

    fn emission_at(&self, uv: [f32; 2]) -> [f32; 3] {
        let mut total = [0.0f32; 3];
        for emitter in &self.emitters {
            let c = match &emitter.color {
                EmitterColor::Constant(c) => *c,
                EmitterColor::Image(img) => sample_bilinear(img, uv),
            };
            total[0] += c[0] * emitter.strength;
            total[1] += c[1] * emitter.strength;
            total[2] += c[2] * emitter.strength;
        }
        total
    }
}

/// Resolve an emitter's color input: an ImageTexture feeding the socket wins
/// over the inline constant; an unbound or uninterpreted driver falls back to
/// the constant.
fn resolve_color<'a>(
    graph: &'a ShaderGraph,
    scene_images: &'a BTreeMap<String, RgbaImage>,
    node: NodeId,
    input_socket: &str,
    constant: [f32; 4],
) -> Result<EmitterColor<'a>, BakeError> {
    let Some(link) = graph.incoming(node, input_socket) else {
        return Ok(EmitterColor::Constant(constant));
    };
    let Some(Node {
        kind: NodeKind::ImageTexture {
            image: Some(ImageRef::Named(name)),
        },
        ..
    }) = graph.node(link.from)
    else {
        return Ok(EmitterColor::Constant(constant));
    };
    let img = scene_images
        .get(name)
        .ok_or_else(|| BakeError::Compute(format!("image '{name}' not found in scene")))?;
    Ok(EmitterColor::Image(img))
}

fn sample_bilinear(img: &RgbaImage, uv: [f32; 2]) -> [f32; 4] {
    let (w, h) = img.dimensions();
    let fx = (uv[0].clamp(0.0, 1.0) * w as f32 - 0.5).max(0.0);
    let fy = (uv[1].clamp(0.0, 1.0) * h as f32 - 0.5).max(0.0);
    let x0 = (fx as u32).min(w - 1);
    let y0 = (fy as u32).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let fetch = |x: u32, y: u32| {
        let p = img.get_pixel(x, y);
        [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ]
    };
    let (p00, p10, p01, p11) = (fetch(x0, y0), fetch(x1, y0), fetch(x0, y1), fetch(x1, y1));

    let mut out = [0.0f32; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        let top = p00[i] * (1.0 - tx) + p10[i] * tx;
        let bottom = p01[i] * (1.0 - tx) + p11[i] * tx;
        *slot = top * (1.0 - ty) + bottom * ty;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::UvLayer;
    use crate::graph::NodeKind;

    fn unit_quad(material_graph: ShaderGraph) -> (Mesh, Material) {
        let mut mesh = Mesh::new("quad");
        mesh.positions = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        mesh.triangles = vec![[0, 1, 2], [0, 2, 3]];
        mesh.uv = Some(UvLayer {
            per_corner: vec![
                [0.0, 0.0],
                [1.0, 0.0],
                [1.0, 1.0],
                [0.0, 0.0],
                [1.0, 1.0],
                [0.0, 1.0],
            ],
        });
        (mesh, Material::new("mat", material_graph))
    }

    fn emissive_graph(color: [f32; 4], strength: f32) -> ShaderGraph {
        let mut g = ShaderGraph::new();
        let e = g.add(NodeKind::Emission { color, strength });
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(e, socket::EMISSION, out, socket::SURFACE);
        g
    }

    fn settings(resolution: u32) -> BakeSettings {
        BakeSettings {
            resolution,
            samples: 4,
            margin: 0,
        }
    }

    #[test]
    fn full_cover_quad_bakes_flat_emission() {
        let (mesh, material) = unit_quad(emissive_graph([0.0, 1.0, 0.0, 1.0], 1.0));
        let images = BTreeMap::new();
        let tex = EmissionRasterizer
            .bake_emission(&mesh, &material, &images, &settings(16))
            .unwrap();

        // Interior texels away from the diagonal seam are fully covered.
        let p = tex.get_pixel(4, 8);
        assert_eq!(p[3], 255);
        assert_eq!(p[0], 0);
        assert_eq!(p[1], 255);
    }

    #[test]
    fn uncovered_texels_stay_transparent_without_margin() {
        let (mut mesh, material) = unit_quad(emissive_graph([1.0; 4], 1.0));
        // Shrink the island to the lower-left quarter.
        if let Some(uv) = &mut mesh.uv {
            for c in &mut uv.per_corner {
                c[0] *= 0.25;
                c[1] *= 0.25;
            }
        }
        let images = BTreeMap::new();
        let tex = EmissionRasterizer
            .bake_emission(&mesh, &material, &images, &settings(32))
            .unwrap();
        assert_eq!(tex.get_pixel(30, 30)[3], 0);
        assert_eq!(tex.get_pixel(1, 1)[3], 255);
    }

    #[test]
    fn dilation_fills_past_island_border() {
        let (mut mesh, material) = unit_quad(emissive_graph([1.0, 0.0, 0.0, 1.0], 1.0));
        if let Some(uv) = &mut mesh.uv {
            for c in &mut uv.per_corner {
                c[0] *= 0.5;
                c[1] *= 0.5;
            }
        }
        let images = BTreeMap::new();
        let no_margin = EmissionRasterizer
            .bake_emission(&mesh, &material, &images, &settings(32))
            .unwrap();
        let with_margin = EmissionRasterizer
            .bake_emission(
                &mesh,
                &material,
                &images,
                &BakeSettings {
                    margin: 4,
                    ..settings(32)
                },
            )
            .unwrap();

        let dilated = (0..32u32)
            .flat_map(|y| (0..32u32).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                no_margin.get_pixel(x, y)[3] == 0 && with_margin.get_pixel(x, y)[3] != 0
            })
            .count();
        assert!(dilated > 0, "margin did not dilate any texel");
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let (mesh, material) = unit_quad(emissive_graph([1.0; 4], 1.0));
        let images = BTreeMap::new();
        let err = EmissionRasterizer
            .bake_emission(&mesh, &material, &images, &settings(0))
            .unwrap_err();
        assert_eq!(err, BakeError::InvalidResolution(0));
    }

    #[test]
    fn image_driven_emission_samples_the_bound_image() {
        let mut g = ShaderGraph::new();
        let tex = g.add(NodeKind::ImageTexture {
            image: Some(ImageRef::Named("glow".to_string())),
        });
        let e = g.add(NodeKind::Emission {
            color: [0.0; 4],
            strength: 1.0,
        });
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(tex, socket::COLOR, e, socket::COLOR);
        g.connect(e, socket::EMISSION, out, socket::SURFACE);

        let (mesh, material) = unit_quad(g);
        let mut images = BTreeMap::new();
        images.insert(
            "glow".to_string(),
            RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])),
        );

        let baked = EmissionRasterizer
            .bake_emission(&mesh, &material, &images, &settings(8))
            .unwrap();
        let p = baked.get_pixel(2, 4);
        assert_eq!(p[2], 255);
        assert_eq!(p[0], 0);
    }

    #[test]
    fn principled_emission_contributes_without_an_emission_node() {
        let mut g = ShaderGraph::new();
        let p = g.add(NodeKind::Principled {
            base_color: [0.8, 0.8, 0.8, 1.0],
            emission_color: [1.0, 1.0, 0.0, 1.0],
            emission_strength: 1.0,
            metallic: 0.0,
            roughness: 0.5,
        });
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(p, socket::BSDF, out, socket::SURFACE);

        let (mesh, material) = unit_quad(g);
        let images = BTreeMap::new();
        let baked = EmissionRasterizer
            .bake_emission(&mesh, &material, &images, &settings(8))
            .unwrap();
        let px = baked.get_pixel(2, 4);
        // Base color is a non-emissive term and must not leak into the bake.
        assert_eq!((px[0], px[1], px[2]), (255, 255, 0));
    }
}
