mod app;
mod headless;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use migraviz::VizConfig;
use migraviz::source::{DemoConfig, DemoSource, FileSource, SnapshotSource};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Synthetic fat-tree data center with a greedy placement optimizer.
    Demo,
    /// Snapshots replayed from a JSON file.
    File,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = SourceKind::Demo)]
    source: SourceKind,

    /// JSON file with one snapshot or an array of snapshots.
    #[arg(long, required_if_eq("source", "file"))]
    snapshots: Option<PathBuf>,

    /// JSON config file; missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<f32>,

    #[arg(long)]
    height: Option<f32>,

    /// Seed of the demo data center.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    #[arg(long, default_value_t = 4)]
    pods: usize,

    #[arg(long, default_value_t = 4)]
    servers_per_pod: usize,

    #[arg(long, default_value_t = 20)]
    containers: usize,

    /// Render to SVG without opening a window.
    #[arg(long)]
    headless: bool,

    /// Simulation ticks run per snapshot in headless mode.
    #[arg(long, default_value_t = 300)]
    ticks: usize,

    /// Snapshots pulled after the initial one in headless mode.
    #[arg(long, default_value_t = 10)]
    steps: usize,

    #[arg(long, default_value = "migraviz.svg")]
    svg_out: PathBuf,

    /// Pull the next snapshot automatically every N seconds in the viewer.
    #[arg(long)]
    auto_advance_secs: Option<f32>,
}

impl Args {
    fn viz_config(&self) -> Result<VizConfig> {
        let mut config = match &self.config {
            Some(path) => VizConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => VizConfig::default(),
        };
        if let Some(width) = self.width {
            config.canvas.width = width;
        }
        if let Some(height) = self.height {
            config.canvas.height = height;
        }
        config.validate().context("invalid command line overrides")?;
        Ok(config)
    }

    fn snapshot_source(&self) -> Result<Box<dyn SnapshotSource>> {
        match self.source {
            SourceKind::Demo => Ok(Box::new(DemoSource::new(DemoConfig {
                pods: self.pods,
                servers_per_pod: self.servers_per_pod,
                containers: self.containers,
                seed: self.seed,
                ..DemoConfig::default()
            }))),
            SourceKind::File => {
                let path = self
                    .snapshots
                    .as_deref()
                    .ok_or_else(|| anyhow!("--snapshots is required with --source file"))?;
                let source = FileSource::open(path)
                    .with_context(|| format!("failed to open snapshots {}", path.display()))?;
                Ok(Box::new(source))
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "migraviz=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.viz_config()?;
    let source = args.snapshot_source()?;
    info!(source = source.name(), headless = args.headless, "starting");

    if args.headless {
        return headless::run(
            config,
            source,
            headless::HeadlessOptions {
                ticks: args.ticks,
                steps: args.steps,
                svg_out: args.svg_out,
            },
        );
    }

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };
    let auto_advance_secs = args.auto_advance_secs;
    eframe::run_native(
        "migraviz",
        options,
        Box::new(move |cc| {
            Ok(Box::new(app::MigrationVizApp::new(
                cc,
                config,
                source,
                auto_advance_secs,
            )))
        }),
    )
    .map_err(|err| anyhow!("viewer failed: {err}"))
}
