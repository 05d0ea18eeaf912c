//! lfs-store CLI
//!
//! Command-line interface for a content store on a local directory or a
//! remote bucket.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use lfs_store::{transform_key, Config, ContentStore, ObjectDescriptor, StorageTarget};
use tracing_subscriber::{fmt, EnvFilter};

/// lfs-store CLI
#[derive(Parser, Debug)]
#[command(name = "lfs-store")]
#[command(about = "Content-addressable object store for LFS objects")]
#[command(version)]
struct Args {
    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct TargetArgs {
    /// TOML config file
    #[arg(short, long, global = true, conflicts_with_all = ["root", "bucket_url"])]
    config: Option<PathBuf>,

    /// Local root directory
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Remote bucket URL (http, https or file)
    #[arg(short, long, global = true, conflicts_with = "root")]
    bucket_url: Option<String>,

    /// Key prefix inside the bucket
    #[arg(short, long, global = true, default_value = "lfs")]
    prefix: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Store(StoreCommand),

    /// Print the storage key for an oid
    Key { oid: String },
}

/// Commands that need an open store
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Store a file under its oid
    Put {
        oid: String,
        size: u64,
        /// File to upload
        file: PathBuf,
    },

    /// Stream an object to stdout or a file
    Get {
        oid: String,
        size: u64,
        /// Start offset in bytes
        #[arg(long, default_value = "0")]
        from: u64,
        /// Write here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check whether an object exists
    Exists { oid: String, size: u64 },

    /// Check an object's size (and with --content, its hash)
    Verify {
        oid: String,
        size: u64,
        #[arg(long)]
        content: bool,
    },

    /// Delete an object
    Delete { oid: String, size: u64 },
}

fn main() -> ExitCode {
    // Initialize tracing/logging (stderr, so `get` can stream to stdout)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lfs_store=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(1)
        }
    }
}

/// Execute the command; `Ok(false)` means a check answered no
fn run(args: Args) -> lfs_store::Result<bool> {
    match args.command {
        Commands::Key { oid } => {
            println!("{}", transform_key(&oid));
            Ok(true)
        }
        Commands::Store(command) => {
            let config = build_config(&args.target)?;
            tracing::debug!("Target: {:?}", config.target);
            let store = ContentStore::open(&config)?;
            run_store_command(&store, command)
        }
    }
}

fn run_store_command(store: &ContentStore, command: StoreCommand) -> lfs_store::Result<bool> {
    match command {
        StoreCommand::Put { oid, size, file } => {
            let descriptor = ObjectDescriptor::parse(&oid, size)?;
            let input = BufReader::new(File::open(&file)?);
            store.put(&descriptor, input)?;
            tracing::info!("Stored {} ({} bytes)", descriptor.oid, descriptor.size);
            Ok(true)
        }
        StoreCommand::Get { oid, size, from, out } => {
            let descriptor = ObjectDescriptor::parse(&oid, size)?;
            let mut reader = store.get(&descriptor, from)?;
            let copied = match out {
                Some(path) => {
                    let mut w = BufWriter::new(File::create(path)?);
                    let n = io::copy(&mut reader, &mut w)?;
                    w.flush()?;
                    n
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    let n = io::copy(&mut reader, &mut stdout)?;
                    stdout.flush()?;
                    n
                }
            };
            tracing::debug!("Wrote {} bytes", copied);
            Ok(true)
        }
        StoreCommand::Exists { oid, size } => {
            let descriptor = ObjectDescriptor::parse(&oid, size)?;
            let exists = store.try_exists(&descriptor)?;
            println!("{}", exists);
            Ok(exists)
        }
        StoreCommand::Verify { oid, size, content } => {
            let descriptor = ObjectDescriptor::parse(&oid, size)?;
            let ok = if content {
                store.verify_content(&descriptor)?
            } else {
                store.verify(&descriptor)?
            };
            println!("{}", ok);
            Ok(ok)
        }
        StoreCommand::Delete { oid, size } => {
            let descriptor = ObjectDescriptor::parse(&oid, size)?;
            store.delete(&descriptor)?;
            Ok(true)
        }
    }
}

/// Resolve the target from flags or a config file
fn build_config(target: &TargetArgs) -> lfs_store::Result<Config> {
    if let Some(path) = &target.config {
        return Config::from_toml_file(path);
    }

    let storage = match (&target.root, &target.bucket_url) {
        (Some(root), _) if root.is_absolute() => StorageTarget::local(root),
        (Some(root), _) => StorageTarget::local(std::env::current_dir()?.join(root)),
        (None, Some(url)) => StorageTarget::resolve(&target.prefix, url)?,
        (None, None) => {
            let cwd = std::env::current_dir()?;
            StorageTarget::local(cwd.join("lfs"))
        }
    };

    Ok(Config::builder().target(storage).build())
}
