use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logo-render", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a logo into an animated 3D frame sequence.
    Render(RenderArgs),
    /// Print the material preset table as JSON.
    Presets,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Logo file (SVG or raster image).
    #[arg(long)]
    logo: PathBuf,

    /// Material preset name.
    #[arg(long)]
    material: Option<String>,

    /// Extrusion depth, 0.01..=1.0.
    #[arg(long)]
    extrude: Option<f64>,

    /// Bevel depth, 0.0..=0.1.
    #[arg(long)]
    bevel: Option<f64>,

    /// Owner id used when publishing the artifact.
    #[arg(long)]
    user_id: Option<String>,

    /// JSON configuration file. Environment overrides still apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the engine timeout.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Presets => cmd_presets(),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let base = match &args.config {
        Some(path) => logo_render::RenderConfig::from_path(path)?,
        None => logo_render::RenderConfig::default(),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(secs) = args.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }

    let bytes = std::fs::read(&args.logo)
        .with_context(|| format!("read logo '{}'", args.logo.display()))?;
    let request = logo_render::RenderRequest {
        logo: logo_render::LogoPayload::Bytes(bytes),
        material: args.material,
        extrude_depth: args.extrude,
        bevel_depth: args.bevel,
        user_id: args.user_id,
    };

    let orchestrator = logo_render::Orchestrator::new(config)?;
    let outcome = orchestrator.submit_blocking(request);
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_completed() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_presets() -> anyhow::Result<()> {
    let table: serde_json::Map<String, serde_json::Value> = logo_render::MaterialPreset::ALL
        .iter()
        .map(|p| -> anyhow::Result<(String, serde_json::Value)> {
            Ok((p.name().to_string(), serde_json::to_value(p.shader())?))
        })
        .collect::<anyhow::Result<_>>()?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}
