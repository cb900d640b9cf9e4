//! Command-line arguments

use crate::error::SimResult;
use crate::workload::Workload;
use clap::{Parser, ValueEnum};
use generational_gc::GcConfig;
use std::path::PathBuf;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Drive a synthetic mutator workload against the generational collector
#[derive(Debug, Parser)]
#[command(name = "gc-sim", version, about)]
pub struct Cli {
    /// JSON collector configuration; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Eden capacity in bytes
    #[arg(long)]
    pub eden_size: Option<usize>,

    /// Initial Old capacity in bytes
    #[arg(long)]
    pub old_size: Option<usize>,

    /// Survival age at which objects are promoted (2..=15)
    #[arg(long)]
    pub promotion_threshold: Option<u8>,

    /// Card size in bytes (power of two)
    #[arg(long)]
    pub card_size: Option<usize>,

    /// Eden size divided by survivor region size
    #[arg(long)]
    pub survivor_ratio: Option<usize>,

    /// Minor cycles between forced major cycles (0 disables)
    #[arg(long)]
    pub major_interval: Option<usize>,

    /// Tune the promotion threshold from survival rates
    #[arg(long)]
    pub adaptive: bool,

    /// Number of objects to allocate
    #[arg(short = 'n', long, default_value_t = 10_000)]
    pub allocations: usize,

    /// Size of each object in bytes
    #[arg(long, default_value_t = 64)]
    pub object_size: usize,

    /// Reference fields per object
    #[arg(long, default_value_t = 2)]
    pub fields: usize,

    /// Probability that a new object is kept as a root
    #[arg(long, default_value_t = 0.1)]
    pub survival: f64,

    /// Most roots kept at once; the oldest root is dropped beyond this
    #[arg(long, default_value_t = 256)]
    pub max_roots: usize,

    /// Probability that a new object is stored into a random rooted object
    #[arg(long, default_value_t = 0.3)]
    pub link_probability: f64,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Builds the collector configuration from the config file and flags.
    pub fn gc_config(&self) -> SimResult<GcConfig> {
        let mut config = match &self.config {
            Some(path) => GcConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => GcConfig::default(),
        };
        if let Some(bytes) = self.eden_size {
            config.eden_size = bytes;
        }
        if let Some(bytes) = self.old_size {
            config.old_size = bytes;
        }
        if let Some(threshold) = self.promotion_threshold {
            config.promotion_threshold = threshold;
        }
        if let Some(card_size) = self.card_size {
            config.card_size = card_size;
        }
        if let Some(ratio) = self.survivor_ratio {
            config.survivor_ratio = ratio;
        }
        if let Some(interval) = self.major_interval {
            config.major_cycle_interval = interval;
        }
        config.validate()?;
        Ok(config)
    }

    /// Workload parameters from the flags.
    pub fn workload(&self) -> SimResult<Workload> {
        let workload = Workload {
            allocations: self.allocations,
            object_size: self.object_size,
            fields: self.fields,
            survival: self.survival,
            max_roots: self.max_roots,
            link_probability: self.link_probability,
            adaptive: self.adaptive,
            seed: self.seed,
        };
        workload.validate()?;
        Ok(workload)
    }

    /// Default log filter for the verbosity level.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
