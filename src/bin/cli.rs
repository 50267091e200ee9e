//! Face resolver CLI
//!
//! Local execution entry point. For AWS Lambda, use `face-resolver-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use face_resolver::{
    aws,
    config::load_config,
    error::{AppError, Result},
    handler::handle_event,
    models::{ImageLocation, UploadEvent},
    pipeline::{CollectionStatus, IdentityResolver},
    recognition::RekognitionService,
    storage::LocalBlobStore,
};
use serde::Serialize;

/// Face resolver - match uploaded faces against a face collection
#[derive(Parser, Debug)]
#[command(
    name = "face-resolver",
    version,
    about = "Resolve faces in uploaded images to identities"
)]

struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process an image stored in S3
    Process {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },

    /// Run the Lambda handler locally on an S3 notification JSON file
    Invoke {
        #[arg(long)]
        event: PathBuf,
    },

    /// Process an image from a local directory laid out like a bucket
    Local {
        /// Root directory holding one sub-directory per container
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value = "uploads")]
        container: String,
        #[arg(long)]
        key: String,
    },

    /// Create the face collection if it does not exist
    EnsureCollection,

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, default_level: &str) {
    let level = if verbose { "debug" } else { default_level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Loaded configuration from {}", cli.config.display());

    let sdk_config = match cli.command {
        Command::Validate => {
            log::info!("✓ Config OK (collection '{}')", config.recognition.collection_id);
            return Ok(());
        }
        _ => aws::load_sdk_config().await,
    };

    match cli.command {
        Command::Validate => {}

        Command::Process { bucket, key } => {
            let resolver = aws::resolver(&sdk_config, config);
            let report = resolver.process(&ImageLocation::new(bucket, key)).await?;
            print_json(&report)?;
        }

        Command::Invoke { event } => {
            let content = std::fs::read_to_string(&event)?;
            let event: UploadEvent = serde_json::from_str(&content)?;

            let resolver = aws::resolver(&sdk_config, config);
            let response = handle_event(&resolver, &event).await;
            print_json(&response)?;

            if !response.success() {
                return Err(AppError::validation(format!(
                    "{} record(s) failed",
                    response.failed
                )));
            }
        }

        Command::Local {
            root,
            container,
            key,
        } => {
            let resolver = IdentityResolver::new(
                Arc::new(LocalBlobStore::new(&root)),
                Arc::new(RekognitionService::from_sdk_config(&sdk_config)),
                Arc::new(config),
            );
            let report = resolver.process(&ImageLocation::new(container, key)).await?;
            print_json(&report)?;
        }

        Command::EnsureCollection => {
            let collection_id = config.recognition.collection_id.clone();
            let resolver = aws::resolver(&sdk_config, config);
            match resolver.ensure_collection().await? {
                CollectionStatus::Created => log::info!("Created collection '{}'", collection_id),
                CollectionStatus::Existing => {
                    log::info!("Collection '{}' already exists", collection_id)
                }
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
