use anyhow::Result;
use clap::Parser;
use class_explorer::cfr::Cfr;
use class_explorer::cli::{Cli, Commands, OutputFormat};
use class_explorer::commands::{self, CommandOutcome, Services};
use class_explorer::config::resolve_cfr_path;
use class_explorer::decompiler::{DecompilerProvider, JarDecompilerProvider};
use class_explorer::engine::CatalogEngine;
use class_explorer::input::InputLines;
use class_explorer::prompt::ConsolePrompt;
use class_explorer::sink::{ConsoleSink, OutputSink, Stream};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Human-readable lines move to stderr when stdout carries JSON.
    let stream = match cli.format {
        OutputFormat::Text => Stream::Stdout,
        OutputFormat::Json => Stream::Stderr,
    };
    let sink: Arc<dyn OutputSink> = Arc::new(ConsoleSink::new(stream));
    let decompilers = || -> Result<Arc<dyn DecompilerProvider>> {
        let cfr = Cfr::new(resolve_cfr_path(&cli)?);
        Ok(Arc::new(JarDecompilerProvider { cfr }))
    };
    let input = Arc::new(InputLines::stdin());
    let services = Services {
        sink: sink.clone(),
        prompt: Arc::new(ConsolePrompt::new(input.clone())),
        input,
        engine: &CatalogEngine,
        decompilers: &decompilers,
    };

    let outcome = match &cli.command {
        Commands::Search(args) => commands::run_search(args, &services)?,
        Commands::Decode(args) => commands::run_decode(args, &services)?,
        Commands::Mapver(args) => commands::run_mapver(args),
        Commands::Batch(args) => commands::run_batch(args),
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => {
            if let CommandOutcome::NotImplemented { name, description } = &outcome {
                sink.write(&format!("'{name}' ({description}) is not implemented yet"));
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}
