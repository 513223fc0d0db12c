use std::collections::BTreeMap;

use image::RgbaImage;

use emberbake::document::{Material, Mesh, Scene};
use emberbake::engine::{BakeEngine, BakeSettings};
use emberbake::error::{BakeError, StageError};
use emberbake::graph::{ImageRef, NodeKind, ShaderGraph, socket};
use emberbake::pipeline::{Pipeline, PipelineOptions};
use emberbake::raster::EmissionRasterizer;
use emberbake::texture_store::TextureStore;
use emberbake::unwrap::SmartProject;

fn emissive_material(name: &str, strength: f32) -> Material {
    let mut g = ShaderGraph::new();
    let e = g.add(NodeKind::Emission {
        color: [1.0, 1.0, 1.0, 1.0],
        strength,
    });
    let out = g.add(NodeKind::MaterialOutput);
    g.connect(e, socket::EMISSION, out, socket::SURFACE);
    Material::new(name, g)
}

fn dark_material(name: &str) -> Material {
    let mut g = ShaderGraph::new();
    let p = g.add(NodeKind::Principled {
        base_color: [0.5, 0.5, 0.5, 1.0],
        emission_color: [0.0; 4],
        emission_strength: 0.0,
        metallic: 0.0,
        roughness: 0.5,
    });
    let out = g.add(NodeKind::MaterialOutput);
    g.connect(p, socket::BSDF, out, socket::SURFACE);
    Material::new(name, g)
}

fn cube_mesh(name: &str, slots: Vec<usize>) -> Mesh {
    let mut mesh = Mesh::new(name);
    mesh.positions = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ];
    mesh.triangles = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
    ];
    mesh.slots = slots;
    mesh
}

fn options() -> PipelineOptions {
    PipelineOptions {
        bake: BakeSettings {
            resolution: 16,
            samples: 4,
            margin: 1,
        },
        jobs: 1,
    }
}

/// The texture-sample -> emission chain driving the surface output, as
/// (emission node count, bound image name).
fn rewired_chain(material: &Material) -> (usize, Option<String>) {
    let g = &material.graph;
    let emission_count = g
        .nodes()
        .filter(|n| matches!(n.kind, NodeKind::Emission { .. }))
        .count();
    let bound = g
        .surface_output()
        .and_then(|out| g.incoming(out, socket::SURFACE))
        .and_then(|l| g.incoming(l.from, socket::COLOR))
        .and_then(|l| g.node(l.from))
        .and_then(|n| match &n.kind {
            NodeKind::ImageTexture {
                image: Some(ImageRef::Named(name)),
            } => Some(name.clone()),
            _ => None,
        });
    (emission_count, bound)
}

#[test]
fn unwrapped_emissive_mesh_bakes_and_rewires() {
    let mut scene = Scene::new("s");
    scene.meshes.push(cube_mesh("lamp", vec![0]));
    scene.materials.push(emissive_material("glow", 1.0));
    assert!(!scene.meshes[0].has_uv());

    let mut pipeline = Pipeline::new(
        &EmissionRasterizer,
        &SmartProject,
        TextureStore::new(),
        options(),
    );
    let result = pipeline.run(&mut scene);

    assert_eq!(result.meshes_processed, 1);
    assert_eq!(result.materials_baked, 1);
    assert!(result.failures.is_empty());
    assert!(result.baked_any());

    // A UV layer was provisioned and persists on the mesh.
    let uv = scene.meshes[0].uv.as_ref().expect("uv was generated");
    assert_eq!(uv.per_corner.len(), scene.meshes[0].corner_count());

    // Exactly one emission node remains, fed by the baked texture.
    let (emission_count, bound) = rewired_chain(&scene.materials[0]);
    assert_eq!(emission_count, 1);
    assert_eq!(bound.as_deref(), Some("glow_emission_baked"));

    // The baked pixels moved into the scene's image table for export.
    let baked = scene.images.get("glow_emission_baked").expect("image kept");
    assert_eq!(baked.width(), 16);
}

#[test]
fn zero_emission_scene_reports_nothing_to_do() {
    let mut scene = Scene::new("s");
    scene.meshes.push(cube_mesh("prop", vec![0]));
    scene.materials.push(dark_material("matte"));

    let mut pipeline = Pipeline::new(
        &EmissionRasterizer,
        &SmartProject,
        TextureStore::new(),
        options(),
    );
    let result = pipeline.run(&mut scene);

    assert_eq!(result.materials_baked, 0);
    assert!(result.failures.is_empty());
    assert!(!result.baked_any());
    assert!(scene.images.is_empty());
}

/// Engine that fails for one material by name and delegates the rest to the
/// CPU rasterizer.
struct FailFor {
    material: &'static str,
}

impl BakeEngine for FailFor {
    fn bake_emission(
        &self,
        mesh: &Mesh,
        material: &Material,
        images: &BTreeMap<String, RgbaImage>,
        settings: &BakeSettings,
    ) -> Result<RgbaImage, BakeError> {
        if material.name == self.material {
            return Err(BakeError::Compute("synthetic engine failure".to_string()));
        }
        EmissionRasterizer.bake_emission(mesh, material, images, settings)
    }
}

#[test]
fn sibling_material_survives_a_bake_failure() {
    let mut scene = Scene::new("s");
    scene.meshes.push(cube_mesh("lamp", vec![0, 1]));
    scene.materials.push(emissive_material("bad", 1.0));
    scene.materials.push(emissive_material("good", 1.0));
    let bad_graph_before = scene.materials[0].graph.clone();

    let engine = FailFor { material: "bad" };
    let mut pipeline = Pipeline::new(&engine, &SmartProject, TextureStore::new(), options());
    let result = pipeline.run(&mut scene);

    assert_eq!(result.materials_baked, 1);
    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.material, "bad");
    assert!(matches!(failure.error, StageError::Bake(_)));

    // The failed material's graph is untouched.
    assert_eq!(scene.materials[0].graph, bad_graph_before);

    // The sibling was rewired to its baked texture.
    let (emission_count, bound) = rewired_chain(&scene.materials[1]);
    assert_eq!(emission_count, 1);
    assert_eq!(bound.as_deref(), Some("good_emission_baked"));
    assert!(scene.images.contains_key("good_emission_baked"));
}

#[test]
fn shared_material_is_baked_once_per_mesh() {
    let mut scene = Scene::new("s");
    scene.meshes.push(cube_mesh("a", vec![0]));
    scene.meshes.push(cube_mesh("b", vec![0]));
    scene.materials.push(emissive_material("shared", 2.0));

    let mut pipeline = Pipeline::new(
        &EmissionRasterizer,
        &SmartProject,
        TextureStore::new(),
        options(),
    );
    let result = pipeline.run(&mut scene);

    // Two independent bakes: one per (mesh, material) pair, each against
    // its own mesh's UV layout.
    assert_eq!(result.meshes_processed, 2);
    assert_eq!(result.materials_baked, 2);
    assert!(result.failures.is_empty());
    assert!(scene.images.contains_key("shared_emission_baked"));
    assert!(scene.images.contains_key("shared_emission_baked_2"));

    // The graph ends bound to the last pair's texture.
    let (emission_count, bound) = rewired_chain(&scene.materials[0]);
    assert_eq!(emission_count, 1);
    assert_eq!(bound.as_deref(), Some("shared_emission_baked_2"));
}

#[test]
fn principled_only_emission_is_baked_and_zeroed() {
    let mut g = ShaderGraph::new();
    let p = g.add(NodeKind::Principled {
        base_color: [0.2, 0.2, 0.2, 1.0],
        emission_color: [0.0, 1.0, 1.0, 1.0],
        emission_strength: 1.0,
        metallic: 0.0,
        roughness: 0.5,
    });
    let out = g.add(NodeKind::MaterialOutput);
    g.connect(p, socket::BSDF, out, socket::SURFACE);

    let mut scene = Scene::new("s");
    scene.meshes.push(cube_mesh("panel", vec![0]));
    scene.materials.push(Material::new("screen", g));

    let mut pipeline = Pipeline::new(
        &EmissionRasterizer,
        &SmartProject,
        TextureStore::new(),
        options(),
    );
    let result = pipeline.run(&mut scene);
    assert_eq!(result.materials_baked, 1);

    // Principled emission strength is zeroed by the rewrite; the node and
    // its other shading terms survive.
    let kinds: Vec<_> = scene.materials[0].graph.nodes().map(|n| &n.kind).collect();
    let principled = kinds
        .iter()
        .find_map(|k| match k {
            NodeKind::Principled {
                base_color,
                emission_strength,
                ..
            } => Some((*base_color, *emission_strength)),
            _ => None,
        })
        .expect("principled node kept");
    assert_eq!(principled, ([0.2, 0.2, 0.2, 1.0], 0.0));
}
