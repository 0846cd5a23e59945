use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tagrelay_cli::{load_config, Gateway, Overrides};
use tagrelay_core::{DownloadRequest, NotesFormat, UpdateCheck, UpdateRequest};
use tagrelay_utils::Platform;

#[derive(Parser)]
#[command(name = "tagrelay")]
#[command(about = "An update gateway in front of GitHub and GitLab releases")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file
    #[arg(long, env = "TAGRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Listen address, overrides the config file
    #[arg(long)]
    listen: Option<String>,

    /// Base URL for links handed to clients
    #[arg(long)]
    public_url: Option<String>,

    /// Release cache lifetime in seconds
    #[arg(long)]
    cache_ttl: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// List known releases
    Releases {
        /// Channel name, or "all"
        #[arg(long, default_value = "all")]
        channel: String,
    },
    /// Resolve the asset a download route would redirect to
    Download {
        /// Platform name such as osx, win64 or linux_deb
        platform: String,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        filetype: Option<String>,
    },
    /// Run an update check as a client would
    Check {
        platform: String,
        /// Version the client runs
        version: String,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        filetype: Option<String>,
    },
    /// Print the rewritten RELEASES manifest for a Windows client
    Manifest {
        platform: String,
        version: String,
        #[arg(long)]
        channel: Option<String>,
    },
    /// Print merged release notes
    Notes {
        /// Oldest version to include
        version: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let overrides = Overrides {
        listen: cli.listen,
        public_url: cli.public_url,
        cache_ttl_secs: cli.cache_ttl,
    };
    let config = load_config(cli.config.as_deref(), &overrides)?;
    let gateway = Gateway::from_config(&config)?;
    let service = gateway.service.clone();

    match cli.command {
        Commands::Serve => {
            if config.pre_fetch {
                gateway.warm_up().await;
            }
            gateway.serve().await?;
        }
        Commands::Releases { channel } => {
            for release in service.list_for_feed(&channel).await? {
                println!(
                    "{}\t{}\t{}\t{} assets",
                    release.tag,
                    release.channel,
                    release.published_at.format("%Y-%m-%d"),
                    release.assets.len()
                );
            }
        }
        Commands::Download {
            platform,
            channel,
            tag,
            filetype,
        } => {
            let platform = Platform::detect(&platform)
                .ok_or_else(|| format!("unknown platform '{}'", platform))?;
            let request = DownloadRequest {
                channel,
                tag,
                platform: Some(platform),
                filename: None,
                filetype,
            };
            let (release, asset) = service.resolve_download(&request).await?;
            println!("{}\t{}\t{}", release.tag, asset.filename, asset.download_url);
        }
        Commands::Check {
            platform,
            version,
            channel,
            filetype,
        } => {
            let request = UpdateRequest {
                platform: Some(platform),
                version: Some(version),
                channel,
                filetype,
            };
            match service.check_update(&request, &gateway.routes()?).await? {
                UpdateCheck::Available(descriptor) => {
                    println!("{}", serde_json::to_string_pretty(&descriptor)?)
                }
                UpdateCheck::NoUpdate => println!("No update available"),
            }
        }
        Commands::Manifest {
            platform,
            version,
            channel,
        } => {
            let request = UpdateRequest {
                platform: Some(platform),
                version: Some(version),
                channel,
                filetype: None,
            };
            let manifest = service.build_manifest(&request, &gateway.routes()?).await?;
            print!("{}", String::from_utf8_lossy(&manifest));
        }
        Commands::Notes { version, json } => {
            let format = if json {
                NotesFormat::Json
            } else {
                NotesFormat::Plain
            };
            print!("{}", service.release_notes(version.as_deref(), format).await?);
        }
    }

    Ok(())
}
