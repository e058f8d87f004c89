//! A small CLI for poking at a table: print its current version, metadata,
//! schema, or the action log, without needing to write any code against the
//! library directly.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lakehouse_kernel::{DeltaResult, Snapshot};
use test_utils::{LocalFileStore, NoopCheckpointReader};

#[derive(Parser)]
#[command(about = "Inspect a table's log, metadata, and schema")]
struct Cli {
    /// Path or URI of the table root.
    table_root: String,

    #[command(subcommand)]
    command: Commands,

    /// Inspect the table as of this version instead of the latest.
    #[arg(long, global = true)]
    version: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version this snapshot resolved to.
    Version,
    /// Print the current metadata action as JSON.
    Metadata,
    /// Print the schema, as canonical JSON.
    Schema,
    /// List the paths of all active data files.
    Files,
}

fn try_main() -> DeltaResult<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // Reads the table's log straight off the local filesystem. A checkpoint
    // can be located and its completeness verified, but its Parquet contents
    // can't actually be decoded without a real columnar reader wired in, so
    // a table relying on one for its full history won't resolve here; a
    // production deployment would supply an object-store-backed `FileStore`
    // and a Parquet-backed `CheckpointReader` instead.
    let store = LocalFileStore;
    let checkpoint_reader = NoopCheckpointReader;
    let snapshot = Snapshot::try_new(&cli.table_root, cli.version, &store, &checkpoint_reader)?;

    match cli.command {
        Commands::Version => println!("{}", snapshot.version()),
        Commands::Metadata => {
            println!("{}", serde_json::to_string_pretty(snapshot.metadata())?);
        }
        Commands::Schema => {
            println!("{}", snapshot.schema()?.to_json_string());
        }
        Commands::Files => {
            for add in snapshot.all_files() {
                println!("{}", add.path);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
