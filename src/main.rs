use alpino_extract::{CorpusConfig, InputFormat, LogProgress, QuerySource, run};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Write the sentences of all Alpino trees matching an XPath query
#[derive(Parser)]
#[command(name = "alpino-extract")]
#[command(version)]
#[command(about = "Extract sentences from Alpino treebanks with XPath", long_about = None)]
struct Cli {
    /// Directory with the input files
    #[arg(short, long, visible_alias = "din")]
    source: PathBuf,

    /// Directory to write one <stem>.txt per input file into
    destination: PathBuf,

    /// XPath query, or a file containing one
    query: String,

    /// Read sharded .data dumps instead of .xml documents
    #[arg(long, visible_alias = "use-ccl-data-processing")]
    sharded: bool,

    /// Count the trees of each file first, for exact progress
    #[arg(long, visible_alias = "exact-tqdm")]
    exact_progress: bool,

    /// More log output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = CorpusConfig {
        source_dir: cli.source,
        destination_dir: cli.destination,
        query: QuerySource::from_arg(&cli.query),
        format: if cli.sharded {
            InputFormat::Sharded
        } else {
            InputFormat::Xml
        },
        exact_progress: cli.exact_progress,
    };

    run(&config, &mut LogProgress::default()).with_context(|| {
        format!(
            "extraction from {} into {} failed",
            config.source_dir.display(),
            config.destination_dir.display()
        )
    })?;
    Ok(())
}
