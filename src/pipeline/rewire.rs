//! Atomic graph rewiring: replace procedural emission with a baked texture
//! lookup.
//!
//! Every edit happens on a cloned staging graph that is validated and then
//! swapped in whole; a failure at any step leaves the material's graph
//! exactly as it was.

use log::info;

use crate::document::Material;
use crate::error::RewireError;
use crate::graph::{ImageRef, NodeId, NodeKind, socket};
use crate::texture_store::BakedTexture;

/// Rewire `material` so its surface output is driven by a
/// texture-sample -> emission chain bound to `baked`:
///
/// 1. locate the surface output (fail without mutating if absent),
/// 2. insert an ImageTexture node bound to the baked image,
/// 3. insert an Emission node fed by the texture's color output,
/// 4. link it into the output's surface socket, replacing any existing link
///    (the replaced link's source node is kept),
/// 5. remove every other Emission node,
/// 6. zero every Principled node's emission strength.
///
/// Orphaned non-emissive nodes are intentionally left in place; the graph
/// gets no garbage collection beyond dropping links incident to removed
/// nodes.
pub fn rewire(material: &mut Material, baked: &BakedTexture) -> Result<(), RewireError> {
    let Some(output) = material.graph.surface_output() else {
        return Err(RewireError::MissingOutput);
    };

    let mut staged = material.graph.clone();

    let texture = staged.add(NodeKind::ImageTexture {
        image: Some(ImageRef::Named(baked.name.clone())),
    });
    let emission = staged.add(NodeKind::Emission {
        color: [1.0, 1.0, 1.0, 1.0],
        strength: 1.0,
    });
    staged.connect(texture, socket::COLOR, emission, socket::COLOR);
    staged.connect(emission, socket::EMISSION, output, socket::SURFACE);

    let stale: Vec<NodeId> = staged
        .nodes()
        .filter(|n| n.id != emission && matches!(n.kind, NodeKind::Emission { .. }))
        .map(|n| n.id)
        .collect();
    for id in stale {
        staged.remove(id);
    }

    for node in staged.nodes_mut() {
        if let NodeKind::Principled {
            emission_strength, ..
        } = &mut node.kind
        {
            *emission_strength = 0.0;
        }
    }

    staged
        .validate()
        .map_err(|e| RewireError::Inconsistent(format!("{e:#}")))?;

    material.graph = staged;
    info!(
        "rewired material '{}' to sample '{}'",
        material.name, baked.name
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ShaderGraph;
    use image::RgbaImage;

    fn baked(name: &str) -> BakedTexture {
        BakedTexture {
            name: name.to_string(),
            pixels: RgbaImage::new(4, 4),
        }
    }

    fn emission(strength: f32) -> NodeKind {
        NodeKind::Emission {
            color: [1.0; 4],
            strength,
        }
    }

    /// The new chain: output.surface <- Emission.emission <- ImageTexture.
    fn chain_nodes(material: &Material) -> (NodeId, NodeId, NodeId) {
        let g = &material.graph;
        let out = g.surface_output().expect("output survives rewire");
        let surface = g.incoming(out, socket::SURFACE).expect("surface driven");
        let color = g
            .incoming(surface.from, socket::COLOR)
            .expect("emission color driven");
        (out, surface.from, color.from)
    }

    #[test]
    fn rewire_builds_the_texture_emission_chain() {
        let mut g = ShaderGraph::new();
        let e = g.add(emission(5.0));
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(e, socket::EMISSION, out, socket::SURFACE);
        let mut material = Material::new("m", g);

        rewire(&mut material, &baked("m_emission_baked")).unwrap();

        let (_, new_emission, tex) = chain_nodes(&material);
        assert!(matches!(
            material.graph.node(new_emission).map(|n| &n.kind),
            Some(NodeKind::Emission { strength, .. }) if *strength == 1.0
        ));
        match material.graph.node(tex).map(|n| &n.kind) {
            Some(NodeKind::ImageTexture {
                image: Some(ImageRef::Named(name)),
            }) => assert_eq!(name, "m_emission_baked"),
            other => panic!("expected bound image texture, got {other:?}"),
        }
        // The pre-existing emission node is gone, and only one remains.
        let emission_count = material
            .graph
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Emission { .. }))
            .count();
        assert_eq!(emission_count, 1);
        assert!(material.graph.validate().is_ok());
    }

    #[test]
    fn replaced_surface_link_source_is_not_deleted() {
        let mut g = ShaderGraph::new();
        let principled = g.add(NodeKind::Principled {
            base_color: [0.5, 0.5, 0.5, 1.0],
            emission_color: [1.0, 0.0, 0.0, 1.0],
            emission_strength: 3.0,
            metallic: 0.2,
            roughness: 0.4,
        });
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(principled, socket::BSDF, out, socket::SURFACE);
        let mut material = Material::new("m", g);

        rewire(&mut material, &baked("t")).unwrap();

        // The principled node survives with its shading terms intact, only
        // its emission strength zeroed.
        match material.graph.node(principled).map(|n| &n.kind) {
            Some(NodeKind::Principled {
                base_color,
                emission_strength,
                metallic,
                roughness,
                ..
            }) => {
                assert_eq!(*base_color, [0.5, 0.5, 0.5, 1.0]);
                assert_eq!(*emission_strength, 0.0);
                assert_eq!(*metallic, 0.2);
                assert_eq!(*roughness, 0.4);
            }
            other => panic!("principled node missing: {other:?}"),
        }
        // But it no longer drives the surface.
        let (_, surface_src, _) = chain_nodes(&material);
        assert_ne!(surface_src, principled);
    }

    #[test]
    fn upstream_of_removed_emission_is_kept() {
        let mut g = ShaderGraph::new();
        let noise = g.add(NodeKind::Other {
            label: "noise".to_string(),
        });
        let e = g.add(emission(1.0));
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(noise, socket::COLOR, e, socket::COLOR);
        g.connect(e, socket::EMISSION, out, socket::SURFACE);
        let mut material = Material::new("m", g);

        rewire(&mut material, &baked("t")).unwrap();

        // No dead-code elimination: the orphaned noise node stays.
        assert!(material.graph.node(noise).is_some());
        // Its link to the removed emission node is gone.
        assert!(
            material
                .graph
                .links()
                .all(|l| l.from != noise && l.to != noise)
        );
        assert!(material.graph.validate().is_ok());
    }

    #[test]
    fn missing_output_fails_without_mutation() {
        let mut g = ShaderGraph::new();
        g.add(emission(1.0));
        let mut material = Material::new("m", g);
        let before = material.graph.clone();

        let err = rewire(&mut material, &baked("t")).unwrap_err();
        assert_eq!(err, RewireError::MissingOutput);
        assert_eq!(material.graph, before);
    }

    #[test]
    fn rewire_twice_converges_to_one_emission_node() {
        let mut g = ShaderGraph::new();
        let e = g.add(emission(2.0));
        let out = g.add(NodeKind::MaterialOutput);
        g.connect(e, socket::EMISSION, out, socket::SURFACE);
        let mut material = Material::new("m", g);

        rewire(&mut material, &baked("first")).unwrap();
        rewire(&mut material, &baked("second")).unwrap();

        let (_, _, tex) = chain_nodes(&material);
        match material.graph.node(tex).map(|n| &n.kind) {
            Some(NodeKind::ImageTexture {
                image: Some(ImageRef::Named(name)),
            }) => assert_eq!(name, "second"),
            other => panic!("expected second texture, got {other:?}"),
        }
        let emission_count = material
            .graph
            .nodes()
            .filter(|n| matches!(n.kind, NodeKind::Emission { .. }))
            .count();
        assert_eq!(emission_count, 1);
    }
}
