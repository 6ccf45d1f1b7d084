//! CLI binary for scenescan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scenescan::{
    analyze, analyze_text, optimize_file, prompts, report, request_token, schema, AnalysisConfig,
    OptimizeOptions, TargetSchema,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Security assessment of a camera frame (JSON to stdout)
  scenescan analyze frame.jpg

  # Strict validation, custom model, markdown report
  scenescan analyze --strict --model llama3.2-vision --report ./notes frame.jpg

  # Keep the normalized JPEG that was transmitted
  scenescan analyze --save-optimized ./optimized frame.jpg

  # Named-entity extraction from a text file
  scenescan entities article.txt

  # Run the HTTP service
  scenescan serve --addr 0.0.0.0:8000

ENVIRONMENT:
  SCENESCAN_BASE_URL   Ollama endpoint (default http://localhost:11434)
  RUST_LOG             Log filter, e.g. RUST_LOG=scenescan=debug"#;

#[derive(Parser)]
#[command(
    name = "scenescan",
    version,
    about = "Structured image analysis with a locally hosted vision language model",
    after_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze an image against a target schema.
    Analyze {
        /// Path to the image file.
        image: PathBuf,

        /// Target schema: security, album.
        #[arg(long, default_value = "security")]
        schema: String,

        /// Write a markdown report into this directory.
        #[arg(long, value_name = "DIR")]
        report: Option<PathBuf>,

        /// Keep a copy of the normalized JPEG that was sent, in this directory.
        #[arg(long, value_name = "DIR")]
        save_optimized: Option<PathBuf>,

        #[command(flatten)]
        model_opts: ModelOpts,

        /// Maximum longer-edge size of the transmitted image in pixels.
        #[arg(long, default_value_t = 640)]
        max_edge: u32,

        /// JPEG quality (1-100).
        #[arg(long, default_value_t = 80)]
        quality: u8,

        /// Send the image as single-channel grayscale.
        #[arg(long)]
        grayscale: bool,
    },

    /// Extract named entities from a text file.
    Entities {
        /// Path to the text file.
        text: PathBuf,

        #[command(flatten)]
        model_opts: ModelOpts,
    },

    /// Run the HTTP service (POST /analyze-image/).
    #[cfg(feature = "server")]
    Serve {
        /// Bind address.
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: String,

        /// Target schema for uploaded images: security, album.
        #[arg(long, default_value = "security")]
        schema: String,

        #[command(flatten)]
        model_opts: ModelOpts,
    },
}

#[derive(Args)]
struct ModelOpts {
    /// Model identifier.
    #[arg(long, default_value = "llava:7b")]
    model: String,

    /// Ollama base URL.
    #[arg(long, env = "SCENESCAN_BASE_URL", default_value = "http://localhost:11434")]
    base_url: String,

    /// Fail on parse/validation errors instead of returning a fallback record.
    #[arg(long)]
    strict: bool,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

fn schema_by_name(name: &str) -> Result<TargetSchema> {
    match name {
        "security" => Ok(schema::security_assessment()),
        "album" => Ok(schema::album_details()),
        other => anyhow::bail!("unknown schema '{other}' (expected: security, album)"),
    }
}

fn config_from(opts: &ModelOpts) -> Result<AnalysisConfig> {
    AnalysisConfig::builder()
        .model(&opts.model)
        .base_url(&opts.base_url)
        .strict(opts.strict)
        .temperature(opts.temperature)
        .api_timeout_secs(opts.timeout)
        .build()
        .context("invalid configuration")
}

fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            image,
            schema: schema_name,
            report: report_dir,
            save_optimized,
            model_opts,
            max_edge,
            quality,
            grayscale,
        } => {
            let target = schema_by_name(&schema_name)?;
            let mut config = config_from(&model_opts)?;
            config.max_edge = max_edge.max(1);
            config.jpeg_quality = quality.clamp(1, 100);
            config.grayscale = grayscale;

            let bar = spinner(&format!("Analyzing {} with {}…", image.display(), config.model));
            let output = analyze(&image, &target, &config).await;
            bar.finish_and_clear();
            let output = output.with_context(|| format!("analysis of '{}' failed", image.display()))?;

            println!("{}", serde_json::to_string_pretty(&output.result)?);
            eprintln!(
                "model: {}  time: {:.1}s  retries: {}",
                output.model,
                output.duration_ms as f64 / 1000.0,
                output.retries
            );

            if let Some(dir) = save_optimized {
                let normalized = optimize_file(&image, &OptimizeOptions::from_config(&config))
                    .context("cannot normalize image for saving")?;
                let source_name = image
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("image");
                let saved = normalized
                    .persist(&dir, source_name, &request_token())
                    .context("failed to save optimized image")?;
                eprintln!("optimized image: {}", saved.display());
            }

            if let Some(dir) = report_dir {
                let stem = image
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("analysis");
                let path = report::write_report(&output, &target, &dir, stem)
                    .await
                    .context("failed to write report")?;
                eprintln!("report: {}", path.display());
            }
        }

        Command::Entities { text, model_opts } => {
            let passage = tokio::fs::read_to_string(&text)
                .await
                .with_context(|| format!("cannot read '{}'", text.display()))?;
            let target = schema::named_entities();
            let config = config_from(&model_opts)?;

            let bar = spinner(&format!("Extracting entities with {}…", config.model));
            let output = analyze_text(
                &prompts::entity_extraction_prompt(&passage),
                &target,
                &config,
            )
            .await;
            bar.finish_and_clear();
            let output = output.context("entity extraction failed")?;

            println!("{}", serde_json::to_string_pretty(&output.result)?);
        }

        #[cfg(feature = "server")]
        Command::Serve {
            addr,
            schema: schema_name,
            model_opts,
        } => {
            let target = schema_by_name(&schema_name)?;
            let config = config_from(&model_opts)?;
            let state = std::sync::Arc::new(
                scenescan::server::AppState::new(config, target).context("cannot build service")?,
            );
            scenescan::server::serve(state, &addr)
                .await
                .context("server exited with an error")?;
        }
    }

    Ok(())
}
