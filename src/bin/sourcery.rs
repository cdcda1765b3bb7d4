use clap::Parser;
use sourcery_rs::{Flatten, Options, load_sync};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Flatten a chain of source maps into one.
#[derive(Debug, Parser)]
#[command(name = "sourcery", version, about)]
struct Cli {
    /// File to resolve.
    #[arg(short, long)]
    input: PathBuf,

    /// Destination (defaults to overwriting the input).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append the flattened map as a data URI instead of writing a .map file.
    #[arg(short, long)]
    datauri: bool,

    /// Point the sourceMappingURL comment at the absolute map path.
    #[arg(long)]
    absolute_path: bool,

    /// Leave sourcesContent out of the flattened map.
    #[arg(short = 'x', long)]
    exclude_content: bool,

    /// full, existing or none.
    #[arg(short, long, default_value = "full")]
    flatten: Flatten,

    /// Directory that relative source paths are rendered against.
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// Value for the map's sourceRoot field.
    #[arg(long)]
    source_root: Option<String>,

    /// Template for sources: [absolute-path], [relative-path], [base-path].
    #[arg(long, default_value = "[relative-path]")]
    source_path_template: String,

    /// Extra directory searched when resolving sources (repeatable).
    #[arg(long = "source-roots")]
    source_roots: Vec<PathBuf>,

    /// Log what is being resolved.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let options = Options {
        flatten: cli.flatten,
        exclude_content: cli.exclude_content,
        source_root: cli.source_root,
        source_path_template: cli.source_path_template,
        base: cli.base,
        source_roots: cli.source_roots,
        ..Options::default()
    }
    .with_legacy_flags(cli.datauri, cli.absolute_path);

    let Some(mut chain) = load_sync(&cli.input, &options)? else {
        eprintln!("{} has no source map, nothing to do", cli.input.display());
        return Ok(());
    };

    let emit = chain.write_sync(cli.output.as_deref(), &options)?;
    let stats = chain.stats();

    eprintln!("Wrote {}", emit.dest.display());
    if stats.untraceable > 0 {
        eprintln!("{} segment(s) could not be traced", stats.untraceable);
    }

    Ok(())
}
