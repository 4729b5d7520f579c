//! vessel_quant
#![deny(missing_docs)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::Logger;
use log::{info, warn};
use parameters_toml::Parameters;
use std::path::PathBuf;
use vessel_quant::{run, Manifest};

/// Quantify marker expression inside and around segmented vessels, band by band.
#[derive(Parser, Debug)]
#[clap(name = "vessel_quant")]
struct Args {
    /// JSON manifest listing every image with its contours, intensities and channels.
    #[clap(long, value_name = "JSON")]
    manifest: PathBuf,

    /// TOML file with expansion, aggregation, normalization and output parameters.
    /// Defaults are used when omitted.
    #[clap(long, value_name = "TOML")]
    parameters: Option<PathBuf>,

    /// Where to write the expression table.
    #[clap(long, value_name = "CSV")]
    output: PathBuf,

    /// Also write the expanded object masks of every image to this directory.
    #[clap(long, value_name = "DIR")]
    masks_dir: Option<PathBuf>,

    /// Log level or flexi_logger filter, for example "debug" or "info,expansion=debug".
    #[clap(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _logger = Logger::try_with_str(&args.log_level)
        .context("Invalid --log-level")?
        .log_to_stderr()
        .start()
        .context("Logger initialization failed")?;

    let params = match &args.parameters {
        Some(path) => Parameters::load(path)?,
        None => Parameters::default(),
    };
    let manifest = Manifest::load(&args.manifest)?;
    let summary = run(&manifest, &params, args.masks_dir.as_deref())?;

    for image in &summary.images {
        for skipped in &image.skipped {
            warn!(
                "image {}: object {} skipped, {}",
                image.image_id, skipped.object_id, skipped.reason
            );
        }
    }
    expression::save_expression_csv(
        &summary.table,
        &params.aggregation.positivity_channel,
        params.expansion.pixel_interval,
        &params.output,
        &args.output,
    )?;
    info!(
        "wrote {} rows to {}, {} objects skipped",
        summary.table.len(),
        args.output.display(),
        summary.n_skipped()
    );

    if !summary.failures.is_empty() {
        let failed: Vec<_> = summary.failures.iter().map(|(id, _)| id.as_str()).collect();
        bail!("{} images failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
