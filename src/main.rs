use clap::{Parser, Subcommand};
use s3os::{DriverConfig, OsSession, S3Driver, S3OsInfo, S3Session, StorageError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// s3os: store and fetch objects in S3, directly or through delegated upload grants
#[derive(Parser, Debug)]
#[command(name = "s3os")]
#[command(about = "Object storage sessions over S3 with delegated POST uploads", long_about = None)]
struct Cli {
    /// Path to the driver configuration file (JSON or YAML)
    #[arg(short, long, env = "S3OS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// AWS Access Key ID, overrides the configuration file
    #[arg(long, env = "AWS_ACCESS_KEY_ID", global = true)]
    access_key_id: Option<String>,

    /// AWS Secret Access Key, overrides the configuration file
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    secret_access_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an upload grant for a key prefix as JSON
    Grant {
        /// Key prefix the grant is scoped to
        prefix: String,
    },
    /// Upload a file and print its URL
    Put {
        file: PathBuf,
        /// Key prefix (ignored with --grant, which carries its own)
        #[arg(long, default_value = "")]
        prefix: String,
        /// Object name, defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Upload with a grant file produced by `s3os grant` instead of a driver
        #[arg(long)]
        grant: Option<PathBuf>,
        /// Custom metadata, as key=value
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Download an object
    Get { key: String, out: PathBuf },
    /// List objects, following every page
    Ls {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        delimiter: Option<String>,
    },
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

async fn open_driver(cli: &Cli) -> Result<S3Driver, StorageError> {
    let path = cli.config.as_ref().ok_or_else(|| {
        StorageError::Config("a configuration file is required (--config)".to_string())
    })?;
    let mut config = DriverConfig::from_file(path)?;
    tracing::info!("Loaded configuration from {}", path.display());

    if let Some(key) = &cli.access_key_id {
        config.access_key_id = Some(key.clone());
    }
    if let Some(secret) = &cli.secret_access_key {
        config.secret_access_key = Some(secret.clone());
    }

    S3Driver::new(config).await
}

async fn run(cli: Cli) -> Result<(), StorageError> {
    match &cli.command {
        Command::Grant { prefix } => {
            let driver = open_driver(&cli).await?;
            let info = driver.new_session(prefix).get_info();
            let json = serde_json::to_string_pretty(&info)
                .map_err(|e| StorageError::Config(e.to_string()))?;
            println!("{}", json);
        }
        Command::Put {
            file,
            prefix,
            name,
            grant,
            meta,
            timeout,
        } => {
            let session = match grant {
                Some(grant_path) => {
                    let raw = tokio::fs::read_to_string(grant_path).await?;
                    let info: S3OsInfo = serde_json::from_str(&raw)
                        .map_err(|e| StorageError::Config(format!("invalid grant: {}", e)))?;
                    S3Session::from_info(info)
                }
                None => open_driver(&cli).await?.new_session(prefix),
            };

            let name = match name {
                Some(name) => name.clone(),
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        StorageError::Config(format!("cannot derive a name from {}", file.display()))
                    })?,
            };
            let data = tokio::fs::File::open(file).await?;
            let meta: HashMap<String, String> = meta.iter().cloned().collect();

            let url = session
                .save_data(
                    &name,
                    Box::new(data),
                    &meta,
                    timeout.map(Duration::from_secs),
                )
                .await?;
            println!("{}", url);
        }
        Command::Get { key, out } => {
            let session = open_driver(&cli).await?.new_session("");
            let mut reader = session.read_data(key).await?;
            let mut file = tokio::fs::File::create(out).await?;
            let written = tokio::io::copy(&mut reader.body, &mut file).await?;
            file.flush().await?;
            tracing::info!(
                "Downloaded {} ({} bytes, etag {})",
                key,
                written,
                reader.info.etag
            );
        }
        Command::Ls { prefix, delimiter } => {
            let session = open_driver(&cli).await?.new_session("");
            let mut page = session
                .list_files(prefix.as_deref(), delimiter.as_deref())
                .await?;
            loop {
                for dir in page.directories() {
                    println!("{:>12}  {:<25}  {}", "DIR", "", dir);
                }
                for file in page.files() {
                    println!(
                        "{:>12}  {:<25}  {}",
                        file.size,
                        file.last_modified.to_rfc3339(),
                        file.name
                    );
                }
                if !page.has_next_page() {
                    break;
                }
                page = page.next_page().await?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        if e.is_timeout() {
            tracing::error!("The operation timed out; it may succeed if retried.");
        }
        std::process::exit(1);
    }
}
