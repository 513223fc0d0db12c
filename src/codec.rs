//! Document codec seam and the built-in scene bundle codec.
//!
//! A `.scnb` scene bundle is a zip container holding `scene.json` plus one
//! PNG entry per image datablock. Images can alternatively live as sibling
//! files referenced by relative path (when not embedding) or as inline
//! base64 data URLs. The container records its up axis; the importer always
//! normalizes geometry back to Z-up, the exporter writes Y-up when asked.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::document::{Light, Material, Mesh, Scene};
use crate::error::DocumentError;

/// Exporter switches; all on by default, matching what a baked document
/// needs to stand alone (embedded images, full vertex payload, the lighting
/// rig, and a Y-up axis convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub embed_images: bool,
    pub include_uvs: bool,
    pub include_normals: bool,
    pub include_vertex_colors: bool,
    pub include_lights: bool,
    pub y_up: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            embed_images: true,
            include_uvs: true,
            include_normals: true,
            include_vertex_colors: true,
            include_lights: true,
            y_up: true,
        }
    }
}

/// Narrow interface over the interchange format. Format fidelity is the
/// codec's own concern; the pipeline only needs these three calls.
pub trait DocumentCodec {
    fn extension(&self) -> &str;
    fn import(&self, path: &Path) -> Result<Scene, DocumentError>;
    fn export(
        &self,
        scene: &Scene,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<(), DocumentError>;
}

/// How one image datablock is stored in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageEntry {
    /// Container entry or path relative to the bundle's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    /// Inline `data:image/...;base64,` payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneDoc {
    #[serde(default)]
    name: String,
    /// "z" or "y"; geometry in the document is expressed in this convention.
    #[serde(default = "default_up_axis")]
    up_axis: String,
    #[serde(default)]
    meshes: Vec<Mesh>,
    #[serde(default)]
    materials: Vec<Material>,
    #[serde(default)]
    lights: Vec<Light>,
    #[serde(default)]
    images: BTreeMap<String, ImageEntry>,
}

fn default_up_axis() -> String {
    "z".to_string()
}

fn z_up_to_y_up(p: [f32; 3]) -> [f32; 3] {
    [p[0], p[2], -p[1]]
}

fn y_up_to_z_up(p: [f32; 3]) -> [f32; 3] {
    [p[0], -p[2], p[1]]
}

fn flip_scene_axes(meshes: &mut [Mesh], lights: &mut [Light], flip: fn([f32; 3]) -> [f32; 3]) {
    for mesh in meshes {
        for p in &mut mesh.positions {
            *p = flip(*p);
        }
        if let Some(normals) = &mut mesh.normals {
            for n in normals {
                *n = flip(*n);
            }
        }
    }
    for light in lights {
        light.position = flip(light.position);
    }
}

pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let s = data_url.trim();
    let Some(rest) = s.strip_prefix("data:") else {
        bail!("not a data URL");
    };
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("invalid data URL: missing comma"))?;
    if !meta
        .split(';')
        .any(|t| t.trim().eq_ignore_ascii_case("base64"))
    {
        bail!("unsupported data URL encoding (expected base64)");
    }
    general_purpose::STANDARD
        .decode(data.trim())
        .or_else(|_| general_purpose::URL_SAFE.decode(data.trim()))
        .map_err(|e| anyhow!("invalid base64 in data URL: {e}"))
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .context("failed to encode png")?;
    Ok(bytes)
}

/// The built-in `.scnb` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneBundleCodec;

impl SceneBundleCodec {
    fn import_inner(&self, path: &Path) -> Result<Scene> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open bundle at {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("failed to read zip archive {}", path.display()))?;

        let scene_json = {
            let mut entry = archive
                .by_name("scene.json")
                .context("missing scene.json in bundle")?;
            let mut buf = String::new();
            entry
                .read_to_string(&mut buf)
                .context("failed to read scene.json from bundle")?;
            buf
        };
        let mut doc: SceneDoc =
            serde_json::from_str(&scene_json).context("failed to parse scene.json")?;

        match doc.up_axis.as_str() {
            "z" => {}
            "y" => flip_scene_axes(&mut doc.meshes, &mut doc.lights, y_up_to_z_up),
            other => bail!("unknown up axis '{other}' (expected 'y' or 'z')"),
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut images = BTreeMap::new();
        for (name, entry) in &doc.images {
            let bytes = if let Some(entry_path) = &entry.path {
                match archive.by_name(entry_path) {
                    Ok(mut zipped) => {
                        let mut bytes = Vec::with_capacity(zipped.size() as usize);
                        zipped.read_to_end(&mut bytes).with_context(|| {
                            format!("failed to read image entry '{entry_path}'")
                        })?;
                        bytes
                    }
                    // Not in the container: a sibling file relative to the
                    // bundle.
                    Err(_) => std::fs::read(base_dir.join(entry_path)).with_context(|| {
                        format!("failed to read external image '{entry_path}'")
                    })?,
                }
            } else if let Some(data_url) = &entry.data_url {
                decode_data_url(data_url)
                    .with_context(|| format!("invalid data URL for image '{name}'"))?
            } else {
                bail!("image '{name}' has neither a path nor a data URL");
            };
            let decoded = image::load_from_memory(&bytes)
                .with_context(|| format!("failed to decode image '{name}'"))?;
            images.insert(name.clone(), decoded.to_rgba8());
        }

        let scene = Scene {
            name: doc.name,
            meshes: doc.meshes,
            materials: doc.materials,
            lights: doc.lights,
            images,
        };
        scene.validate_refs()?;
        Ok(scene)
    }

    fn export_inner(&self, scene: &Scene, path: &Path, options: &ExportOptions) -> Result<()> {
        let mut meshes = scene.meshes.clone();
        for mesh in &mut meshes {
            if !options.include_uvs {
                mesh.uv = None;
            }
            if !options.include_normals {
                mesh.normals = None;
            }
            if !options.include_vertex_colors {
                mesh.colors = None;
            }
        }
        let mut lights = if options.include_lights {
            scene.lights.clone()
        } else {
            Vec::new()
        };
        if options.y_up {
            flip_scene_axes(&mut meshes, &mut lights, z_up_to_y_up);
        }

        let mut image_entries = BTreeMap::new();
        let mut external: Vec<(String, Vec<u8>)> = Vec::new();
        for name in scene.images.keys() {
            let entry_path = format!("images/{name}.png");
            image_entries.insert(
                name.clone(),
                ImageEntry {
                    path: Some(entry_path),
                    data_url: None,
                },
            );
        }

        let doc = SceneDoc {
            name: scene.name.clone(),
            up_axis: if options.y_up { "y" } else { "z" }.to_string(),
            meshes,
            materials: scene.materials.clone(),
            lights,
            images: image_entries,
        };
        let scene_json = serde_json::to_string_pretty(&doc).context("failed to serialize scene")?;

        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create bundle at {}", path.display()))?;
        let mut archive = zip::ZipWriter::new(file);
        let entry_options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        archive
            .start_file("scene.json", entry_options)
            .context("failed to start scene.json entry")?;
        archive
            .write_all(scene_json.as_bytes())
            .context("failed to write scene.json")?;

        for (name, pixels) in &scene.images {
            let png = encode_png(pixels).with_context(|| format!("image '{name}'"))?;
            if options.embed_images {
                archive
                    .start_file(format!("images/{name}.png"), entry_options)
                    .with_context(|| format!("failed to start image entry '{name}'"))?;
                archive
                    .write_all(&png)
                    .with_context(|| format!("failed to write image entry '{name}'"))?;
            } else {
                external.push((format!("images/{name}.png"), png));
            }
        }
        archive.finish().context("failed to finish bundle")?;

        // Flat layout: images land next to the bundle instead of inside it.
        if !external.is_empty() {
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(base_dir.join("images"))
                .context("failed to create images directory")?;
            for (rel, png) in external {
                std::fs::write(base_dir.join(&rel), png)
                    .with_context(|| format!("failed to write external image '{rel}'"))?;
            }
        }
        Ok(())
    }
}

impl DocumentCodec for SceneBundleCodec {
    fn extension(&self) -> &str {
        "scnb"
    }

    fn import(&self, path: &Path) -> Result<Scene, DocumentError> {
        self.import_inner(path).map_err(|source| DocumentError::Import {
            path: path.to_path_buf(),
            source,
        })
    }

    fn export(
        &self,
        scene: &Scene,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<(), DocumentError> {
        self.export_inner(scene, path, options)
            .map_err(|source| DocumentError::Export {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_decodes_png_bytes() {
        let src = RgbaImage::from_pixel(1, 1, image::Rgba([7, 8, 9, 255]));
        let png = encode_png(&src).unwrap();
        let b64 = general_purpose::STANDARD.encode(&png);
        let data_url = format!("data:image/png;base64,{b64}");

        let bytes = decode_data_url(&data_url).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.width(), 1);
        assert_eq!(img.height(), 1);
    }

    #[test]
    fn data_url_rejects_non_base64_payloads() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("not a url").is_err());
    }

    #[test]
    fn axis_flip_round_trips() {
        let p = [1.0, 2.0, 3.0];
        assert_eq!(y_up_to_z_up(z_up_to_y_up(p)), p);
        // Z-up "up" becomes Y-up "up".
        assert_eq!(z_up_to_y_up([0.0, 0.0, 1.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn scene_doc_defaults_to_z_up() {
        let doc: SceneDoc = serde_json::from_str(r#"{"name":"s"}"#).unwrap();
        assert_eq!(doc.up_axis, "z");
        assert!(doc.meshes.is_empty());
    }
}
