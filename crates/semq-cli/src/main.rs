//! semq CLI: semantic query compiler
//!
//! Commands: compile, run, explain, completions

use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{CommandFactory, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use semq_core::CompilerConfig;
use semq_description::{Description, Query};
use semq_index::{CachedLookup, Fixture, IndexManager};
use semq_query::{
    compile, execute, format_explain, format_plan, format_results, Backend, Collaborators,
    CompiledQuery, OutputFormat,
};

#[derive(Parser)]
#[command(name = "semq")]
#[command(version)]
#[command(about = "Compile semantic queries to SQL or SPARQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Compiler configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Where lookups are answered from.
#[derive(clap::Args)]
struct StoreArgs {
    /// YAML fixture loaded into an in-memory store
    #[arg(long, conflicts_with = "db")]
    fixture: Option<PathBuf>,

    /// SQLite store file
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the backend query for a query file
    #[command(alias = "c")]
    Compile {
        /// Query JSON file, or `-` for stdin
        query: PathBuf,
        #[arg(long, default_value_t = Backend::Sql)]
        backend: Backend,
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Compile to SQL and execute against a store
    #[command(alias = "r")]
    Run {
        /// Query JSON file, or `-` for stdin
        query: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show the segments or condition parts a query compiles to
    Explain {
        /// Query JSON file, or `-` for stdin
        query: PathBuf,
        #[arg(long, default_value_t = Backend::Sql)]
        backend: Backend,
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Table,
    Markdown,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => Self::Json,
            Format::Table => Self::Table,
            Format::Markdown => Self::Markdown,
        }
    }
}

fn init_tracing(verbose: u8) {
    // Without -v only warnings are shown; RUST_LOG still wins when set.
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => CompilerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompilerConfig::default(),
    };

    match cli.command {
        Commands::Compile {
            query,
            backend,
            format,
            store,
        } => {
            let lookup = CachedLookup::new(open_store(&store)?);
            let compiled = compile_file(&query, backend, &lookup, &config)?;
            println!("{}", format_plan(&compiled, format.into()));
        }
        Commands::Run {
            query,
            format,
            store,
        } => {
            if store.fixture.is_none() && store.db.is_none() {
                bail!("run needs a store: pass --fixture or --db");
            }
            let lookup = CachedLookup::new(open_store(&store)?);
            let compiled = compile_file(&query, Backend::Sql, &lookup, &config)?;
            let result = execute(lookup.inner(), &compiled)?;
            println!("{}", format_results(&result, format.into()));
        }
        Commands::Explain {
            query,
            backend,
            format,
            store,
        } => {
            let lookup = CachedLookup::new(open_store(&store)?);
            let compiled = compile_file(&query, backend, &lookup, &config)?;
            print!("{}", format_explain(&compiled, format.into()));
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "semq", &mut std::io::stdout());
        }
    }
    Ok(())
}

fn open_store(args: &StoreArgs) -> anyhow::Result<IndexManager> {
    if let Some(path) = &args.fixture {
        let fixture =
            Fixture::load(path).with_context(|| format!("loading fixture {}", path.display()))?;
        return Ok(fixture.into_index()?);
    }
    if let Some(path) = &args.db {
        return IndexManager::open(path)
            .with_context(|| format!("opening store {}", path.display()));
    }
    // No store: every lookup misses, which still yields a valid plan.
    Ok(IndexManager::in_memory()?)
}

fn compile_file(
    path: &Path,
    backend: Backend,
    lookup: &CachedLookup<IndexManager>,
    config: &CompilerConfig,
) -> anyhow::Result<CompiledQuery> {
    let query = read_query(path)?;
    let compiled = compile(&query, backend, Collaborators::from_store(lookup), config)?;
    for diagnostic in &compiled.diagnostics {
        eprintln!("warning: query degraded: {diagnostic}");
    }
    Ok(compiled)
}

/// A query file holds either a full query or a bare description.
fn read_query(path: &Path) -> anyhow::Result<Query> {
    let source = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };

    match serde_json::from_str::<Query>(&source) {
        Ok(query) => Ok(query),
        Err(query_err) => match serde_json::from_str::<Description>(&source) {
            Ok(description) => Ok(Query::new(description)),
            Err(_) => Err(anyhow::Error::new(query_err).context(format!(
                "{} is neither a query nor a description",
                path.display()
            ))),
        },
    }
}
