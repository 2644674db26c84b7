use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::transfer::{
    ResourceTemplate, TransferSettings, DEFAULT_CHUNK_SIZE, DEFAULT_DOWNLOAD_TEMPLATE, DEFAULT_UPLOAD_TEMPLATE,
};
use crate::workload::SUFFIX_LEN;
use crate::Error;

pub const DEFAULT_PARALLEL: NonZeroUsize = match NonZeroUsize::new(2) {
    Some(size) => size,
    None => unreachable!(),
};

/// Protocol spoken to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    /// `google.bytestream.ByteStream` over gRPC.
    #[default]
    Grpc,
    /// `GET`/`PUT`/`HEAD` over HTTP.
    Http,
}

/// Run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote service address: `host:port` for gRPC, a base URL for HTTP.
    pub addr: String,
    pub transport: Transport,
    /// Root directory to scan for files.
    pub root: PathBuf,
    /// Number of times to download each file.
    pub download_iterations: u32,
    /// Number of times to upload each file, each time with a new suffix.
    pub upload_iterations: u32,
    /// Number of workers per benchmark phase.
    pub parallel: NonZeroUsize,
    pub download_template: String,
    pub upload_template: String,
    pub chunk_size: NonZeroUsize,
    /// Length of the random suffix appended to uploaded files.
    pub suffix_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: String::new(),
            transport: Transport::default(),
            root: PathBuf::from("."),
            download_iterations: 0,
            upload_iterations: 0,
            parallel: DEFAULT_PARALLEL,
            download_template: DEFAULT_DOWNLOAD_TEMPLATE.to_owned(),
            upload_template: DEFAULT_UPLOAD_TEMPLATE.to_owned(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            suffix_len: SUFFIX_LEN,
        }
    }
}

impl Config {
    /// Reject configurations with nothing to measure or nothing to connect to.
    pub fn validate(&self) -> Result<(), Error> {
        if self.download_iterations == 0 && self.upload_iterations == 0 {
            return Err(Error::Config(
                "need to specify at least one of upload or download iterations".into(),
            ));
        }

        if self.addr.is_empty() {
            return Err(Error::Config("missing remote service address".into()));
        }

        Ok(())
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            download_template: ResourceTemplate::new(&self.download_template),
            upload_template: ResourceTemplate::new(&self.upload_template),
            chunk_size: self.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_iterations() {
        let config = Config {
            addr: "localhost:9092".into(),
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_addr() {
        let config = Config {
            download_iterations: 1,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_single_phase_is_enough() {
        for (download_iterations, upload_iterations) in [(1, 0), (0, 1)] {
            let config = Config {
                addr: "localhost:9092".into(),
                download_iterations,
                upload_iterations,
                ..Default::default()
            };

            assert!(config.validate().is_ok());
        }
    }
}
