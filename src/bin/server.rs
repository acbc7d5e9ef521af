use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use rustcache::auth::HtpasswdFile;
use rustcache::storage::{MemoryStorage, MultiStorage, SledStorage, Storage};
use rustcache::{server, Error};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StorageType {
    /// Single in-memory engine
    Memory,
    /// Several in-memory engines sharded by key hash
    MultiMemory,
    /// File-backed engine (lists unsupported)
    Sled,
}

#[derive(Parser, Debug)]
struct Args {
    /// Host and port to listen on
    #[arg(long, default_value = "127.0.0.1:9999")]
    listen: String,

    /// Path to a htpasswd file; leave unset to disable authentication
    #[arg(long)]
    htpasswd: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StorageType::Memory)]
    storage_type: StorageType,

    /// Max number of stored elements per memory engine
    #[arg(long, default_value_t = 10000)]
    storage_memory_size: usize,

    /// Number of engines inside the multi-memory storage
    #[arg(long, default_value_t = 4)]
    storage_multi_memory_count: usize,

    /// Seconds between expired item collection runs
    #[arg(long, default_value_t = 60)]
    storage_gc_interval_secs: u64,

    /// Path to the sled database file
    #[arg(long)]
    storage_sled_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    let gc_interval = Duration::from_secs(args.storage_gc_interval_secs.max(1));

    let storage: Arc<dyn Storage> = match args.storage_type {
        StorageType::Memory => Arc::new(MemoryStorage::new(args.storage_memory_size, gc_interval)?),
        StorageType::MultiMemory => {
            let mut storages: Vec<Box<dyn Storage>> = Vec::new();
            for _ in 0..args.storage_multi_memory_count {
                storages.push(Box::new(MemoryStorage::new(
                    args.storage_memory_size,
                    gc_interval,
                )?));
            }
            Arc::new(MultiStorage::new(storages)?)
        }
        StorageType::Sled => {
            let path = args
                .storage_sled_path
                .ok_or("--storage-sled-path is required for the sled storage type")?;
            Arc::new(SledStorage::open(path, gc_interval)?)
        }
    };

    let validator = match &args.htpasswd {
        Some(path) => match HtpasswdFile::load(path) {
            Ok(file) => Some(Arc::new(file)),
            Err(err) => {
                eprintln!(
                    "cannot read htpasswd file {}: {err}; starting with authentication disabled",
                    path.display()
                );
                None
            }
        },
        None => None,
    };

    server::run(&args.listen, storage, validator).await
}
