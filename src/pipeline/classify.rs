//! Material classification: does emission visibly affect the rendered
//! output?

use crate::document::Material;
use crate::graph::NodeKind;

/// True iff the material's graph can contribute emission: among the nodes
/// upstream-reachable from the surface output, an Emission node exists, or a
/// Principled node has a non-zero emission color channel or a positive
/// emission strength. Read-only, infallible; a material with no nodes or no
/// surface output classifies false (malformed graphs are treated as
/// non-emissive).
pub fn classify(material: &Material) -> bool {
    let graph = &material.graph;
    let Some(output) = graph.surface_output() else {
        return false;
    };
    let reachable = graph.upstream_reachable(output);
    graph
        .nodes()
        .filter(|n| reachable.contains(&n.id))
        .any(|n| match &n.kind {
            NodeKind::Emission { .. } => true,
            NodeKind::Principled {
                emission_color,
                emission_strength,
                ..
            } => emission_color[..3].iter().any(|c| *c > 0.0) || *emission_strength > 0.0,
            _ => false,
        })
}
