use std::path::PathBuf;

use anyhow::{Result, anyhow};

use emberbake::batch::{self, BatchOptions, DocumentOutcome};
use emberbake::codec::{DocumentCodec, ExportOptions, SceneBundleCodec};
use emberbake::engine::BakeSettings;
use emberbake::pipeline::PipelineOptions;
use emberbake::raster::EmissionRasterizer;
use emberbake::unwrap::SmartProject;

#[derive(Debug, Clone)]
struct Cli {
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    resolution: u32,
    samples: u32,
    margin: u32,
    jobs: usize,
    flat_images: bool,
    z_up: bool,
}

impl Default for Cli {
    fn default() -> Self {
        let bake = BakeSettings::default();
        Self {
            input: None,
            output_dir: None,
            resolution: bake.resolution,
            samples: bake.samples,
            margin: bake.margin,
            jobs: 1,
            flat_images: false,
            z_up: false,
        }
    }
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
        args.get(i + 1)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing value for {flag}"))
    }

    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--output-dir" | "--outputdir" => {
                cli.output_dir = Some(PathBuf::from(value(args, i, "--output-dir")?));
                i += 2;
            }
            "--resolution" => {
                cli.resolution = value(args, i, "--resolution")?
                    .parse()
                    .map_err(|e| anyhow!("invalid --resolution: {e}"))?;
                i += 2;
            }
            "--samples" => {
                cli.samples = value(args, i, "--samples")?
                    .parse()
                    .map_err(|e| anyhow!("invalid --samples: {e}"))?;
                i += 2;
            }
            "--margin" => {
                cli.margin = value(args, i, "--margin")?
                    .parse()
                    .map_err(|e| anyhow!("invalid --margin: {e}"))?;
                i += 2;
            }
            "--jobs" => {
                cli.jobs = value(args, i, "--jobs")?
                    .parse()
                    .map_err(|e| anyhow!("invalid --jobs: {e}"))?;
                i += 2;
            }
            "--flat-images" => {
                cli.flat_images = true;
                i += 1;
            }
            "--z-up" => {
                cli.z_up = true;
                i += 1;
            }
            other if other.starts_with("--") => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: <input>, --output-dir <dir>, \
                     --resolution <n>, --samples <n>, --margin <n>, --jobs <n>, \
                     --flat-images, --z-up)"
                ));
            }
            other => {
                if cli.input.is_some() {
                    return Err(anyhow!("more than one input given: {other}"));
                }
                cli.input = Some(PathBuf::from(other));
                i += 1;
            }
        }
    }
    Ok(cli)
}

fn main() -> Result<()> {
    env_logger::init();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow!("usage: emberbake <bundle.scnb | directory> [options]"))?;

    let codec = SceneBundleCodec;
    let inputs = if input.is_dir() {
        let found = batch::scan_directory(&input, codec.extension())?;
        if found.is_empty() {
            return Err(anyhow!(
                "no .{} documents found in {}",
                codec.extension(),
                input.display()
            ));
        }
        found
    } else {
        vec![input]
    };

    let options = BatchOptions {
        pipeline: PipelineOptions {
            bake: BakeSettings {
                resolution: cli.resolution,
                samples: cli.samples,
                margin: cli.margin,
            },
            jobs: cli.jobs.max(1),
        },
        export: ExportOptions {
            embed_images: !cli.flat_images,
            y_up: !cli.z_up,
            ..ExportOptions::default()
        },
        output_dir: cli.output_dir,
    };

    let report = batch::run_batch(
        &inputs,
        &codec,
        &EmissionRasterizer,
        &SmartProject,
        &options,
    );

    for doc in &report.documents {
        match &doc.outcome {
            DocumentOutcome::Exported { output, result } => {
                println!(
                    "[baked] {} -> {} ({} materials, {} failures)",
                    doc.input.display(),
                    output.display(),
                    result.materials_baked,
                    result.failures.len()
                );
                for failure in &result.failures {
                    println!(
                        "    failed: {}/{}: {}",
                        failure.mesh, failure.material, failure.error
                    );
                }
            }
            DocumentOutcome::NothingToBake { result } => {
                println!(
                    "[skip]  {} (nothing to bake, {} failures)",
                    doc.input.display(),
                    result.failures.len()
                );
            }
            DocumentOutcome::Failed(e) => {
                println!("[error] {}: {e}", doc.input.display());
            }
        }
    }
    println!(
        "batch: {} documents, {} exported, {} failed",
        report.documents.len(),
        report.exported_count(),
        report.failed_count()
    );

    if report.any_exported() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
