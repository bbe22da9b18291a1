use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Branching of the density-grid index.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Tree {
    Octree,
    Binary,
}

#[derive(Debug, Parser)]
#[command(name = "narval")]
#[command(about = "Offline volumetric path tracer")]
pub struct Args {
    /// Scene description (JSON)
    pub scene: PathBuf,

    /// Output image; `.png` writes an 8-bit preview, anything else a 16-bit PPM
    #[arg(short, long, default_value = "render.ppm")]
    pub output: PathBuf,

    /// Samples per pixel (overrides the scene settings)
    #[arg(long)]
    pub spp: Option<u32>,

    /// Maximum scattering events per path (overrides the scene settings)
    #[arg(long)]
    pub bounces: Option<u32>,

    /// Worker threads (overrides the scene settings)
    #[arg(long)]
    pub threads: Option<u32>,

    /// Root random seed (overrides the scene settings)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Replace broken scene parts with fallbacks instead of aborting
    #[arg(long)]
    pub lenient: bool,

    #[arg(long, value_enum, default_value = "octree")]
    pub tree: Tree,

    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}
