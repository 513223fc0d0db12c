//! Batch controller: import, pipeline, export for each input document.
//!
//! Document failures are isolated: one bad import or export is recorded and
//! the batch moves on. No transaction spans documents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::codec::{DocumentCodec, ExportOptions};
use crate::engine::BakeEngine;
use crate::error::DocumentError;
use crate::pipeline::{Pipeline, PipelineOptions, PipelineResult};
use crate::texture_store::TextureStore;
use crate::unwrap::Unwrapper;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub pipeline: PipelineOptions,
    pub export: ExportOptions,
    /// Where outputs land; next to their input when unset.
    pub output_dir: Option<PathBuf>,
}

/// What happened to one input document.
#[derive(Debug)]
pub enum DocumentOutcome {
    /// At least one material baked; the rewired scene was exported.
    Exported {
        output: PathBuf,
        result: PipelineResult,
    },
    /// The pipeline ran but found nothing to bake; no output written.
    NothingToBake { result: PipelineResult },
    /// Import or export failed; the rest of this document was skipped.
    Failed(DocumentError),
}

#[derive(Debug)]
pub struct DocumentReport {
    pub input: PathBuf,
    pub outcome: DocumentOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    /// Drives the process exit status: did any document export with at least
    /// one bake? Individual failures do not negate this.
    pub fn any_exported(&self) -> bool {
        self.documents
            .iter()
            .any(|d| matches!(d.outcome, DocumentOutcome::Exported { .. }))
    }

    pub fn exported_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.outcome, DocumentOutcome::Exported { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.outcome, DocumentOutcome::Failed(_)))
            .count()
    }
}

/// Output path for an input document: same stem with `_baked` appended,
/// same extension, in `output_dir` (or alongside the input when unset).
pub fn derived_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string());
    let mut file_name = format!("{stem}_baked");
    if let Some(ext) = input.extension() {
        file_name.push('.');
        file_name.push_str(&ext.to_string_lossy());
    }
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(file_name)
}

/// Collect every document with the codec's extension directly under `dir`,
/// sorted by path so batch order is stable.
pub fn scan_directory(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to scan directory {}", dir.display()))?;
    let mut inputs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();
    inputs.sort();
    Ok(inputs)
}

/// Run the whole batch. Each document is import -> pipeline -> export (the
/// export only when something was baked); a document-level failure is
/// recorded and the next input is processed regardless.
pub fn run_batch(
    inputs: &[PathBuf],
    codec: &dyn DocumentCodec,
    engine: &dyn BakeEngine,
    unwrapper: &dyn Unwrapper,
    options: &BatchOptions,
) -> BatchReport {
    let mut report = BatchReport::default();
    for input in inputs {
        let outcome = process_document(input, codec, engine, unwrapper, options);
        if let DocumentOutcome::Failed(e) = &outcome {
            warn!("document {} failed: {e}", input.display());
        }
        report.documents.push(DocumentReport {
            input: input.clone(),
            outcome,
        });
    }
    report
}

fn process_document(
    input: &Path,
    codec: &dyn DocumentCodec,
    engine: &dyn BakeEngine,
    unwrapper: &dyn Unwrapper,
    options: &BatchOptions,
) -> DocumentOutcome {
    let mut scene = match codec.import(input) {
        Ok(scene) => scene,
        Err(e) => return DocumentOutcome::Failed(e),
    };

    let mut pipeline = Pipeline::new(engine, unwrapper, TextureStore::new(), options.pipeline);
    let result = pipeline.run(&mut scene);
    if !result.baked_any() {
        info!("{}: nothing to bake", input.display());
        return DocumentOutcome::NothingToBake { result };
    }

    let output = derived_output_path(input, options.output_dir.as_deref());
    match codec.export(&scene, &output, &options.export) {
        Ok(()) => {
            info!(
                "{}: baked {} materials, exported {}",
                input.display(),
                result.materials_baked,
                output.display()
            );
            DocumentOutcome::Exported { output, result }
        }
        Err(e) => DocumentOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_inserts_baked_before_the_extension() {
        assert_eq!(
            derived_output_path(Path::new("/scenes/lamp.scnb"), None),
            PathBuf::from("/scenes/lamp_baked.scnb")
        );
        assert_eq!(
            derived_output_path(Path::new("/scenes/lamp.scnb"), Some(Path::new("/out"))),
            PathBuf::from("/out/lamp_baked.scnb")
        );
        assert_eq!(
            derived_output_path(Path::new("bare"), None),
            PathBuf::from("bare_baked")
        );
    }

    #[test]
    fn scan_picks_only_matching_extensions_sorted() {
        let dir = std::env::temp_dir().join(format!("emberbake_scan_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.scnb", "a.scnb", "notes.txt", "c.SCNB"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let found = scan_directory(&dir, "scnb").unwrap();
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.scnb", "b.scnb", "c.SCNB"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
