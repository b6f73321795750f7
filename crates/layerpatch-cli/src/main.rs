use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use layerpatch_installer::{InstalledIdentity, InstalledImage};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod render;

use render::{InstallationReport, OutputStyle};

#[derive(Parser, Debug)]
#[command(name = "layerpatch")]
#[command(about = "Inspect the layers, add-ons and patch state of an installation", long_about = None)]
struct Cli {
    /// Installation root.
    #[arg(long, default_value = ".")]
    home: PathBuf,
    /// Module roots to search instead of `<home>/modules`.
    #[arg(long = "module-root")]
    module_roots: Vec<PathBuf>,
    /// Bundle roots to search instead of `<home>/bundles`.
    #[arg(long = "bundle-root")]
    bundle_roots: Vec<PathBuf>,
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Identity and its patch state.
    Info,
    /// Resolved layers and add-ons with their roots and patch state.
    Layers,
    /// Every patch id recorded in the installation.
    History,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!(home = %cli.home.display(), command = ?cli.command, "running");
    let installed = discover(&cli)?;
    let report = InstallationReport::from_installed(&installed);
    let style = OutputStyle::detect(cli.json);

    let rendered = match cli.command {
        Commands::Info => render::render_info(&report, style)?,
        Commands::Layers => render::render_layers(&report, style)?,
        Commands::History => render::render_history(&report, style)?,
    };
    println!("{rendered}");
    Ok(())
}

fn discover(cli: &Cli) -> Result<InstalledIdentity> {
    let image = InstalledImage::new(&cli.home);
    let product = image.load_product_config()?;
    let module_roots = if cli.module_roots.is_empty() {
        vec![image.modules_dir()]
    } else {
        cli.module_roots.clone()
    };
    let bundle_roots = if cli.bundle_roots.is_empty() {
        vec![image.bundles_dir()]
    } else {
        cli.bundle_roots.clone()
    };

    InstalledIdentity::discover(image, product, module_roots, bundle_roots)
        .with_context(|| format!("failed to discover installation at {}", cli.home.display()))
}
