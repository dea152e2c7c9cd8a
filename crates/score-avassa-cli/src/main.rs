mod cmd;
mod root;

use clap::{Parser, Subcommand};
use cmd::generate::GenerateOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "score-avassa",
    about = "Convert Score workloads into Avassa application specs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .score-avassa/)
    #[arg(long, global = true, env = "SCORE_AVASSA_ROOT")]
    root: Option<PathBuf>,

    /// Log progress at info level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project: state directory, default provisioners, sample score file
    Init {
        /// Do not write a sample score.yaml
        #[arg(long)]
        no_sample: bool,
    },

    /// Add score files to the project and write Avassa application specs
    Generate {
        /// Score files to add or update
        files: Vec<PathBuf>,

        /// Output file ('-' for stdout)
        #[arg(long, short = 'o', default_value = score_avassa_core::paths::DEFAULT_OUTPUT_FILE)]
        output: PathBuf,

        /// Write the manifests to stdout instead of a file
        #[arg(long)]
        stdout: bool,

        /// YAML document deep-merged into the score file (single file only)
        #[arg(long)]
        overrides_file: Option<PathBuf>,

        /// Set (path=value) or remove (path=) a property in the score file (single file only)
        #[arg(long = "override-property")]
        override_properties: Vec<String>,

        /// Image for containers declared with image '.' (single file only)
        #[arg(long)]
        image: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { no_sample } => cmd::init::run(&root, !no_sample),
        Commands::Generate {
            files,
            output,
            stdout,
            overrides_file,
            override_properties,
            image,
        } => cmd::generate::run(
            &root,
            GenerateOptions {
                files,
                output,
                stdout,
                overrides_file,
                override_properties,
                image,
            },
        ),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
