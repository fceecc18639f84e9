//! CQL data requirements command-line interface

use clap::{Parser, Subcommand};
use octofhir_cql::cli::analyze::{self, AnalyzeConfig};
use octofhir_cql::cli::output::{self, ColorMode, OutputFormat};
use std::path::PathBuf;

/// CQL data requirements tool
#[derive(Parser)]
#[command(name = "cql-requirements")]
#[command(author, version, about = "Data requirements analysis for CQL (ELM JSON) libraries", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Pretty, global = true)]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Color output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gather the data requirements of ELM JSON libraries
    Analyze {
        /// ELM JSON files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Restrict the analysis to these expressions
        #[arg(short, long = "expression")]
        expressions: Vec<String>,

        /// Library search paths
        #[arg(short = 'L', long = "library-path")]
        library_paths: Vec<PathBuf>,

        /// Maximum expression nesting depth
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    output::setup_colors(cli.color);

    let result = match cli.command {
        Commands::Analyze {
            files,
            expressions,
            library_paths,
            max_depth,
        } => analyze::analyze(AnalyzeConfig {
            files,
            expressions,
            library_paths,
            max_depth,
            output_format: cli.format,
            output_file: cli.output.clone(),
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}
