// A small runner for the `band_regions` library: loads a session configuration
// and a saved region file, then classifies, summarizes, or exports.

use anyhow::{Context, bail};
use band_regions::{LoadOutcome, ParallelClassifier, RegionSession, SessionConfig};
use std::sync::Arc;

const USAGE: &str = "usage:
  band_regions summary  <config.json> <region.json>
  band_regions classify <config.json> <region.json> <x,y>...
  band_regions export   <config.json> <region.json> <labels.png> [colors.json]";

fn open_session(config_path: &str, region_path: &str) -> anyhow::Result<RegionSession> {
    let config = SessionConfig::from_json_file(config_path)
        .with_context(|| format!("reading session config {config_path}"))?;
    let mut session = RegionSession::new(config)?;
    match session
        .load_region(region_path)
        .with_context(|| format!("loading region {region_path}"))?
    {
        LoadOutcome::Loaded => Ok(session),
        LoadOutcome::NoFile => bail!("no usable region file at {region_path}"),
    }
}

fn parse_sample(text: &str) -> anyhow::Result<(f64, f64)> {
    let (x, y) = text
        .split_once(',')
        .with_context(|| format!("sample {text:?} is not of the form x,y"))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    println!("Band Regions - Classification Runner");

    match args.as_slice() {
        [command, config, region] if command == "summary" => {
            let session = open_session(config, region)?;
            let model = session.model();
            println!("channels: {}", session.config().channels);
            for (index, layer) in model.layers().iter().enumerate().skip(1) {
                println!(
                    "layer {index}: {} polygons, {} bins",
                    layer.polygons().len(),
                    layer.raster().covered_cells()
                );
            }
            println!("union: {} bins", model.union_raster().covered_cells());
        }
        [command, config, region, samples @ ..] if command == "classify" && !samples.is_empty() => {
            let session = open_session(config, region)?;
            let (xs, ys): (Vec<f64>, Vec<f64>) = samples
                .iter()
                .map(|s| parse_sample(s))
                .collect::<anyhow::Result<Vec<_>>>()?
                .into_iter()
                .unzip();
            let labels = ParallelClassifier::new()
                .classify(session.mask(), Arc::from(xs.clone()), Arc::from(ys.clone()))
                .await?;
            for ((x, y), label) in xs.iter().zip(&ys).zip(labels) {
                println!("({x}, {y}) -> {label}");
            }
        }
        [command, config, region, output, rest @ ..] if command == "export" && rest.len() <= 1 => {
            let mut session = open_session(config, region)?;
            if let Some(colors) = rest.first() {
                session.colors_mut().load(colors);
            }
            let union = session.model().union_raster();
            union
                .save_png(output)
                .with_context(|| format!("writing labels to {output}"))?;
            let preview = std::path::Path::new(output).with_extension("preview.png");
            session
                .colors()
                .colorize(&union)
                .save(&preview)
                .with_context(|| format!("writing preview to {}", preview.display()))?;
            println!("labels written to {output}, preview to {}", preview.display());
        }
        _ => bail!("{USAGE}"),
    }
    Ok(())
}
