//! Headless driver for the chunk streaming and meshing session.
#![forbid(unsafe_code)]

mod driver;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tessera_blocks::MaterialCatalog;
use tessera_mesh_cpu::ExtractorKind;
use tessera_runtime::{SessionConfig, load_config_from_path};

use crate::driver::DriverOptions;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ExtractorArg {
    Faces,
    MarchingCubes,
}

impl From<ExtractorArg> for ExtractorKind {
    fn from(a: ExtractorArg) -> Self {
        match a {
            ExtractorArg::Faces => ExtractorKind::Faces,
            ExtractorArg::MarchingCubes => ExtractorKind::MarchingCubes,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tessera", version, about = "Streams, meshes and saves a voxel world around a walking actor")]
struct Cli {
    /// Session config (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Material overrides (TOML) applied on top of the builtin table.
    #[arg(long)]
    materials: Option<PathBuf>,
    #[arg(long)]
    save_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// Simulated seconds per tick.
    #[arg(long, default_value_t = 0.05)]
    dt: f32,
    #[arg(long, value_enum)]
    extractor: Option<ExtractorArg>,
    #[arg(long)]
    view_radius: Option<i32>,
    /// Delete existing chunk files before starting.
    #[arg(long)]
    clear_saves: bool,
    /// Do not wait for workers between ticks.
    #[arg(long)]
    free_run: bool,
}

fn session_config(cli: &Cli) -> Result<SessionConfig, Box<dyn Error>> {
    let mut cfg = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => SessionConfig::default(),
    };
    if let Some(dir) = &cli.save_dir {
        cfg.persistence.save_dir = dir.clone();
    }
    if let Some(kind) = cli.extractor {
        cfg.meshing.extractor = kind.into();
    }
    if let Some(r) = cli.view_radius {
        cfg.streaming.view_radius = r;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let cfg = session_config(&cli)?;
    let catalog = match &cli.materials {
        Some(path) => MaterialCatalog::from_path(path)?,
        None => MaterialCatalog::builtin(),
    };
    if !(cli.dt.is_finite() && cli.dt > 0.0) {
        return Err(format!("--dt must be a positive number, got {}", cli.dt).into());
    }
    let opts = DriverOptions {
        ticks: cli.ticks,
        dt: cli.dt,
        clear_saves: cli.clear_saves,
        lockstep: !cli.free_run,
    };
    let summary = driver::run(cfg, catalog, opts)?;
    println!("{summary}");
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
