use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use blobload::config::{Config, Transport, DEFAULT_PARALLEL};
use blobload::transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_TEMPLATE, DEFAULT_UPLOAD_TEMPLATE};
use blobload::workload::SUFFIX_LEN;
use blobload::Outcome;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Generate upload and download load against a remote blob store and report throughput.
///
/// Every regular file under the root directory is uploaded once, then downloaded and/or uploaded again, each
/// upload with a new random suffix so that every uploaded object is distinct.
#[derive(Parser, Debug)]
#[command(name = "blobload")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address of the remote service: `host:port` for gRPC, a base URL for HTTP.
    #[arg(long)]
    addr: String,

    /// Protocol spoken to the remote service.
    #[arg(long, value_enum, default_value_t = Transport::Grpc)]
    transport: Transport,

    /// Root directory to scan for files.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Number of times to download each file.
    #[arg(long, default_value_t = 0)]
    download_iterations: u32,

    /// Number of times to upload each file.
    #[arg(long, default_value_t = 0)]
    upload_iterations: u32,

    /// Number of parallel downloads/uploads to perform.
    #[arg(long, default_value_t = DEFAULT_PARALLEL)]
    parallel: NonZeroUsize,

    /// Resource name, download template.
    #[arg(long, default_value = DEFAULT_DOWNLOAD_TEMPLATE)]
    download_template: String,

    /// Resource name, upload template.
    #[arg(long, default_value = DEFAULT_UPLOAD_TEMPLATE)]
    upload_template: String,

    /// Size of upload write chunks, in bytes.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: NonZeroUsize,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            addr: args.addr,
            transport: args.transport,
            root: args.dir,
            download_iterations: args.download_iterations,
            upload_iterations: args.upload_iterations,
            parallel: args.parallel,
            download_template: args.download_template,
            upload_template: args.upload_template,
            chunk_size: args.chunk_size,
            suffix_len: SUFFIX_LEN,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = Config::from(Args::parse());

    match std::path::absolute(&config.root) {
        Ok(root) => config.root = root,
        Err(err) => {
            tracing::error!("Invalid root directory `{}`: {err}", config.root.display());
            return ExitCode::FAILURE;
        }
    }

    match blobload::run_remote(&config).await {
        Ok(Outcome::NoFiles | Outcome::Completed { .. }) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
