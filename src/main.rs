use anyhow::Context;
use clap::{Parser, ValueEnum};
use invscan_core::Catalog;
use invscan_cv::DetectionConfig;
use std::path::PathBuf;

mod parser;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Default,
    Precision,
    Recall,
    Fast,
}

#[derive(Parser)]
#[command(name = "invscan")]
#[command(about = "Identify the items in a game hotbar screenshot")]
#[command(version)]
struct Cli {
    /// Screenshot to scan.
    image: PathBuf,

    /// Item catalog (JSON). Defaults to the config's catalog_file.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Template directory; may be given more than once.
    #[arg(long = "templates")]
    template_dirs: Vec<PathBuf>,

    /// Root for relative catalog image paths.
    #[arg(long)]
    base_path: Option<String>,

    /// Detection config (JSON); missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting preset, used when no config file is given.
    #[arg(long, value_enum, default_value_t = PresetArg::Default)]
    preset: PresetArg,

    /// Retry with other presets until this many items are found.
    #[arg(long, default_value = "1")]
    min_detections: usize,

    /// Write the full detection output (JSON) here.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DetectionConfig::from_json_file(path)?,
        None => match cli.preset {
            PresetArg::Default => DetectionConfig::default(),
            PresetArg::Precision => DetectionConfig::for_precision(),
            PresetArg::Recall => DetectionConfig::for_recall(),
            PresetArg::Fast => DetectionConfig::fast(),
        },
    };
    if !cli.template_dirs.is_empty() {
        config.template_dirs = cli.template_dirs.clone();
    }
    if let Some(base) = &cli.base_path {
        config.template_base_path = Some(base.clone());
    }
    if let Some(catalog) = &cli.catalog {
        config.catalog_file = catalog.clone();
    }

    let catalog = Catalog::load(&config.catalog_file)
        .with_context(|| format!("Failed to load catalog: {:?}", config.catalog_file))?;

    let library = parser::load_library(&config, &catalog).await;
    let output =
        parser::detect_inventory(&cli.image, &catalog, config.clone(), &library, cli.min_detections)?;
    parser::print_summary(&output);

    if let Some(path) = &cli.out {
        parser::write_output(&output, config, &catalog, path)?;
        println!("Results written to {:?}", path);
    }

    Ok(())
}
