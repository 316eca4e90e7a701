//! `batchwatch` command line tool.
//!
//! Stores local files, starts a batch against the processing backend and
//! copies each processed file into a repository directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use batchwatch::batch::BatchPersistence;
use batchwatch::config::{load_config, validate_config};
use batchwatch::db::Database;
use batchwatch::logging::{init_logging, LogFormat};
use batchwatch::{
    BatchCoordinator, BatchError, BatchSnapshot, BlobStore, CoordinatorConfig, DirectoryUploader,
    FileMetadata, FsBlobStore, JobStatus, SseEventSource, StoredFile,
};

#[derive(Parser, Debug)]
#[command(name = "batchwatch")]
#[command(about = "Track a multi-file processing batch and upload its results")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long, env = "BATCHWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Backend base URL when no config file is given
    #[arg(
        long,
        env = "BATCHWATCH_BASE_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    base_url: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a batch from local files and follow it to the end
    Watch {
        /// Batch id announced by the backend; a random one when omitted
        #[arg(long)]
        batch_id: Option<String>,

        /// Directory processed files are copied into
        #[arg(short, long)]
        repository: PathBuf,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Reconnect to the batch persisted by an earlier run
    Resume {
        #[arg(short, long)]
        repository: PathBuf,
    },
    /// Print the persisted batch
    Status,
    /// Forget the persisted batch and its stored files
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> batchwatch::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = CoordinatorConfig::new(&cli.base_url);
            validate_config(&config)?;
            config
        }
    };

    match cli.command {
        Command::Watch {
            batch_id,
            repository,
            files,
        } => {
            let blobs: Arc<dyn BlobStore> =
                Arc::new(FsBlobStore::new(&config.storage.blob_directory));
            let coordinator = open_coordinator(&config, Arc::clone(&blobs))?;

            let mut names = Vec::with_capacity(files.len());
            let mut metadata = Vec::with_capacity(files.len());
            for path in &files {
                let file = read_file(path).await?;
                metadata.push(FileMetadata::new(
                    &uuid::Uuid::new_v4().to_string(),
                    &file.name,
                    file.size(),
                ));
                names.push(file.name.clone());
                blobs.put_file(file).await?;
            }

            let batch_id = batch_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            coordinator.set_uploader(DirectoryUploader::new(&repository));
            coordinator.start_batch(&batch_id, names.as_slice(), metadata).await?;
            tracing::info!("Watching batch {}", batch_id);

            Ok(follow(&coordinator).await)
        }
        Command::Resume { repository } => {
            let blobs: Arc<dyn BlobStore> =
                Arc::new(FsBlobStore::new(&config.storage.blob_directory));
            let coordinator = open_coordinator(&config, blobs)?;
            if !coordinator.is_active() {
                println!("No batch to resume");
                return Ok(ExitCode::SUCCESS);
            }
            coordinator.set_uploader(DirectoryUploader::new(&repository));
            Ok(follow(&coordinator).await)
        }
        Command::Status => {
            let persistence = BatchPersistence::new(Database::open(&config.storage.database_path)?);
            match persistence.load()? {
                None => println!("No batch in progress"),
                Some(batch) => {
                    println!(
                        "Batch {} ({}/{} uploaded)",
                        batch.batch_id,
                        batch.uploaded.len(),
                        batch.jobs.len()
                    );
                    for job in &batch.jobs {
                        println!("  {:>3}%  {:<10}  {}", job.progress, job.status.to_string(), job.file_name);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear => {
            let persistence = BatchPersistence::new(Database::open(&config.storage.database_path)?);
            persistence.clear()?;
            FsBlobStore::new(&config.storage.blob_directory).clear().await?;
            println!("Cleared persisted batch");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_coordinator(
    config: &CoordinatorConfig,
    blobs: Arc<dyn BlobStore>,
) -> batchwatch::Result<BatchCoordinator> {
    let database = Database::open(&config.storage.database_path)?;
    let events = SseEventSource::new(&config.event_stream.base_url)?;
    Ok(BatchCoordinator::new(config, database, blobs, Arc::new(events)))
}

async fn read_file(path: &Path) -> batchwatch::Result<StoredFile> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| BatchError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(StoredFile::new(&name, bytes))
}

/// Prints progress until the batch completes, fails or loses its stream.
async fn follow(coordinator: &BatchCoordinator) -> ExitCode {
    let mut states = coordinator.watch();
    let mut notices = coordinator.notices();
    let mut seen_connected = false;
    let mut last_line = String::new();

    loop {
        let snapshot = states.borrow_and_update().clone();
        let line = progress_line(&snapshot);
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }

        if snapshot.is_complete {
            println!("Batch complete");
            return ExitCode::SUCCESS;
        }
        if snapshot.has_error {
            return ExitCode::FAILURE;
        }
        seen_connected |= snapshot.is_connected;
        let processing = snapshot.jobs.iter().any(|j| j.status.is_in_flight());
        if seen_connected && !snapshot.is_connected && processing {
            println!("Connection lost; run `batchwatch resume` to continue");
            return ExitCode::FAILURE;
        }

        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    return ExitCode::FAILURE;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("{}", notice.message),
                Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} notice(s)", n),
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                coordinator.disconnect();
                println!("Interrupted; progress saved, run `batchwatch resume` to continue");
                return ExitCode::FAILURE;
            }
        }
    }
}

fn progress_line(snapshot: &BatchSnapshot) -> String {
    let mut line = format!("[{:>3}%]", snapshot.overall_progress);
    for job in &snapshot.jobs {
        let mark = match job.status {
            JobStatus::Completed => "done".to_string(),
            JobStatus::Uploading => "uploading".to_string(),
            JobStatus::Failed | JobStatus::Error => "failed".to_string(),
            JobStatus::Pending | JobStatus::Processing => format!("{}%", job.progress),
        };
        line.push_str(&format!(" {}={}", job.file_name, mark));
    }
    line
}
