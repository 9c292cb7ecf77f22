use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::warn;
use serde::Serialize;

use gerber_panelizer::batch::{read_batch, write_batch};
use gerber_panelizer::error::PanelError;
use gerber_panelizer::geometry::{Coord, Point};
use gerber_panelizer::gerber::macros::EvaluatedPrimitive;
use gerber_panelizer::layer::{BBox, Layer};
use gerber_panelizer::{BatchMerger, BatchSettings, MouseBites, MouseBitesSettings};

#[derive(Parser)]
#[command(name = "gerber-panelizer", about = "Combine Gerber/Excellon board sets into a panel")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place batches and write the merged panel as a ZIP archive
    Merge {
        /// Panel name, used in output file names
        #[arg(short, long, default_value = "panel")]
        name: String,

        /// Batch to place, as NAME=PATH.zip@X,Y (repeatable)
        #[arg(short, long = "batch", value_parser = parse_placement, required = true)]
        batches: Vec<Placement>,

        /// Break-away bridge, as X,Y,RADIUS (repeatable)
        #[arg(long = "bites", value_parser = parse_bites)]
        bites: Vec<(f64, f64, f64)>,

        /// Hole spacing for bridges, in mm
        #[arg(long, default_value_t = MouseBitesSettings::default().drill_distance)]
        drill_distance: f64,

        /// Hole diameter for bridges, in mm
        #[arg(long, default_value_t = MouseBitesSettings::default().drill_diameter)]
        drill_diameter: f64,

        /// JSON file with output file name patterns
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Output ZIP file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Describe every layer in a batch archive as JSON
    Info {
        /// Input ZIP file
        input: PathBuf,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Debug, Clone)]
struct Placement {
    name: String,
    path: PathBuf,
    x: f64,
    y: f64,
}

fn parse_placement(s: &str) -> Result<Placement, String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH@X,Y, got {s}"))?;
    let (path, position) = rest
        .rsplit_once('@')
        .ok_or_else(|| format!("missing @X,Y in {s}"))?;
    let (x, y) = position
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y after @, got {position}"))?;
    Ok(Placement {
        name: name.to_string(),
        path: PathBuf::from(path),
        x: x.trim().parse().map_err(|_| format!("bad X: {x}"))?,
        y: y.trim().parse().map_err(|_| format!("bad Y: {y}"))?,
    })
}

fn parse_bites(s: &str) -> Result<(f64, f64, f64), String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|_| format!("bad number: {v}")))
        .collect::<Result<_, _>>()?;
    match values[..] {
        [x, y, r] if r > 0.0 => Ok((x, y, r)),
        [_, _, _] => Err(format!("radius must be positive in {s}")),
        _ => Err(format!("expected X,Y,RADIUS, got {s}")),
    }
}

#[derive(Serialize)]
struct LayerInfo<'a> {
    name: &'a str,
    function: &'static str,
    bbox: Option<BBox>,
    commands: Option<usize>,
    holes: Option<usize>,
    apertures: Vec<ApertureInfo>,
}

#[derive(Serialize)]
struct ApertureInfo {
    code: u32,
    template: String,
    value: String,
    primitives: Option<Vec<EvaluatedPrimitive>>,
}

fn open_batch(name: &str, path: &Path) -> Result<gerber_panelizer::Batch, PanelError> {
    read_batch(name, BufReader::new(File::open(path)?))
}

fn run_merge(
    name: &str,
    placements: &[Placement],
    bites: &[(f64, f64, f64)],
    bites_settings: MouseBitesSettings,
    settings: Option<&Path>,
    output: &Path,
) -> Result<(), PanelError> {
    let settings = match settings {
        Some(path) => BatchSettings::load(path)?,
        None => BatchSettings::default(),
    };

    let mut merger = BatchMerger::new(name);
    for placement in placements {
        let batch = open_batch(&placement.name, &placement.path)?;
        let id = merger.add_batch(batch);
        merger.place_batch_instance(
            id,
            Coord::from_f64(placement.x),
            Coord::from_f64(placement.y),
        )?;
    }
    for &(x, y, r) in bites {
        merger.add_feature(MouseBites::new(
            Point::from_f64(x, y),
            Coord::from_f64(r),
            bites_settings,
        ));
    }

    merger.merge()?;
    for feature in merger.features() {
        if !feature.is_valid() {
            warn!("Bridge {} does not join two outlines, skipped", feature.id());
        }
    }

    let file = File::create(output)?;
    write_batch(&merger.merged_batch(), &settings, file)?;
    eprintln!("Written to {}", output.display());
    Ok(())
}

fn run_info(path: &Path, pretty: bool) -> Result<String, PanelError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("batch");
    let batch = open_batch(name, path)?;

    let mut infos = Vec::new();
    for (function, layer) in batch.layers() {
        let info = match layer {
            Layer::Gerber(g) => {
                let mut apertures = Vec::new();
                for a in g.apertures() {
                    apertures.push(ApertureInfo {
                        code: a.code,
                        template: a.template.clone(),
                        value: a.value.clone(),
                        primitives: g.evaluate_aperture(a.code)?,
                    });
                }
                LayerInfo {
                    name: g.name(),
                    function: function.display_name(),
                    bbox: (!g.bbox().is_empty()).then(|| g.bbox()),
                    commands: Some(g.commands().len()),
                    holes: None,
                    apertures,
                }
            }
            Layer::Excellon(e) => LayerInfo {
                name: e.name(),
                function: function.display_name(),
                bbox: (!e.bbox().is_empty()).then(|| e.bbox()),
                commands: None,
                holes: Some(e.holes().len()),
                apertures: Vec::new(),
            },
        };
        infos.push(info);
    }

    let json = if pretty {
        serde_json::to_string_pretty(&infos)?
    } else {
        serde_json::to_string(&infos)?
    };
    Ok(json)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Merge {
            name,
            batches,
            bites,
            drill_distance,
            drill_diameter,
            settings,
            output,
        } => run_merge(
            &name,
            &batches,
            &bites,
            MouseBitesSettings {
                drill_distance,
                drill_diameter,
            },
            settings.as_deref(),
            &output,
        ),
        Command::Info { input, pretty } => run_info(&input, pretty).map(|json| println!("{json}")),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
