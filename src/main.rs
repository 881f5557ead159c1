//! # Rune Engine CLI (`rune`)
//!
//! ## Usage
//!
//! ```bash
//! rune --config ./config/rune.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rune generate <file>` | Run the pipeline over one file and save the rune |
//! | `rune show <json>` | Print a saved rune |
//! | `rune serve proxy` | Start the provider proxy |
//! | `rune smoke vision` | Caption an example image through the proxy |
//! | `rune smoke transcribe` | Transcribe a synthetic tone through the proxy |
//!
//! Logs go to stderr (`RUST_LOG` controls verbosity) so exported JSON on
//! stdout stays clean.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use rune_engine::assemble::{GenerateOptions, RuneAssembler};
use rune_engine::config::{self, Config};
use rune_engine::media::InputFile;
use rune_engine::models::Rune;
use rune_engine::smoke::{self, SmokeReport};
use rune_engine::{proxy, store};

/// Rune Engine CLI: turn media files into nine-field semantic runes.
#[derive(Parser)]
#[command(
    name = "rune",
    about = "Rune Engine: multimodal understanding and embedding fusion",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rune.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/rune.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a rune from one input file.
    Generate {
        /// Input file (text, image, audio or video).
        file: PathBuf,

        /// Rune name (defaults to the model's suggestion or the file name).
        #[arg(long)]
        name: Option<String>,

        /// Rune category.
        #[arg(long)]
        category: Option<String>,

        /// Do not persist the rune.
        #[arg(long)]
        no_save: bool,
    },

    /// Print a persisted rune.
    Show {
        /// Path to a rune JSON document.
        path: PathBuf,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Diagnostic calls through a running proxy.
    Smoke {
        #[command(subcommand)]
        check: SmokeCheck,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Start the same-origin provider proxy.
    Proxy,
}

#[derive(Subcommand)]
enum SmokeCheck {
    /// Caption an example image URL.
    Vision {
        #[arg(long, default_value = smoke::DEFAULT_IMAGE_URL)]
        url: String,
    },
    /// Transcribe a synthetic one-second tone.
    Transcribe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rune_engine=info,rune=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Generate {
            file,
            name,
            category,
            no_save,
        } => run_generate(&cfg, &file, name, category, no_save).await?,
        Commands::Show { path } => {
            let rune = store::load_rune(&path)
                .await
                .with_context(|| format!("Failed to load rune: {}", path.display()))?;
            print_summary(&rune);
        }
        Commands::Serve { service } => match service {
            ServeService::Proxy => proxy::run_proxy(&cfg.proxy).await?,
        },
        Commands::Smoke { check } => {
            let report = match check {
                SmokeCheck::Vision { url } => smoke::smoke_vision(&cfg.gateway, &url).await?,
                SmokeCheck::Transcribe => smoke::smoke_transcribe(&cfg.gateway).await?,
            };
            print_smoke(&report);
        }
    }

    Ok(())
}

async fn run_generate(
    cfg: &Config,
    path: &Path,
    name: Option<String>,
    category: Option<String>,
    no_save: bool,
) -> anyhow::Result<()> {
    // unreadable input is reported before any pipeline work
    let file = InputFile::from_path(path).await?;

    let mut assembler = RuneAssembler::from_config(cfg)?;
    if !no_save {
        assembler = assembler.with_store(store::create_backend(&cfg.workspace));
    }

    let generated = assembler
        .generate(&file, &GenerateOptions { name, category })
        .await;
    print_summary(&generated.rune);

    if let Some(outcome) = &generated.save {
        match (outcome.success, &outcome.path) {
            (true, Some(p)) => eprintln!("Saved to {}", p.display()),
            (true, None) => {}
            (false, _) => anyhow::bail!(
                "Save failed for {}: {}",
                generated.rune.id(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    Ok(())
}

fn print_summary(rune: &Rune) {
    let fields = &rune.nine_fields;
    eprintln!("id:        {}", rune.id());
    eprintln!("name:      {}", rune.name);
    eprintln!("category:  {}", rune.category);
    eprintln!("intent:    {}", fields.core.intent);
    eprintln!("essence:   {}", fields.core.essence);
    eprintln!("emotion:   {}", fields.metadata.emotion);
    eprintln!("keywords:  {}", fields.metadata.keywords.join(", "));
    eprintln!("fallback:  {}", rune.fallback);
    eprintln!("vector:    {} dims", rune.vector.len());
}

fn print_smoke(report: &SmokeReport) {
    println!("status: {}", report.status);
    if report.text.is_empty() {
        println!("body:   {}", report.body);
    } else {
        println!("text:   {}", report.text);
    }
}
