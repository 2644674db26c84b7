//! This module provides the download and upload procedures executed by workers.

use std::num::NonZeroUsize;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, TryStreamExt};
use tokio::fs;
use tokio::io::{self, AsyncRead, AsyncReadExt};
use uuid::Uuid;

use crate::digest::Digest;
use crate::transport::{ByteStream, WriteChunk};
use crate::workload::{DownloadUnit, UploadUnit, WorkUnit};
use crate::{Direction, Error};

pub const DEFAULT_DOWNLOAD_TEMPLATE: &str = "instance-name/blobs/{sha256}/{size}";
pub const DEFAULT_UPLOAD_TEMPLATE: &str = "instance-name/uploads/{uuid}/blobs/{sha256}/{size}";
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(1 << 16) {
    Some(size) => size,
    None => unreachable!(),
};

/// A resource name template.
///
/// `{sha256}` is replaced with the hexadecimal digest, `{size}` with the decimal size and `{uuid}` with a random
/// unique identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTemplate(String);

impl ResourceTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, digest: &Digest, size: u64, uuid: Option<&Uuid>) -> String {
        let mut name = self.0.replace("{sha256}", &digest.to_hex()).replace("{size}", &size.to_string());

        if let Some(uuid) = uuid {
            name = name.replace("{uuid}", &uuid.to_string());
        }

        name
    }
}

/// Everything a worker needs besides its client to run a unit.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub download_template: ResourceTemplate,
    pub upload_template: ResourceTemplate,
    pub chunk_size: NonZeroUsize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            download_template: ResourceTemplate::new(DEFAULT_DOWNLOAD_TEMPLATE),
            upload_template: ResourceTemplate::new(DEFAULT_UPLOAD_TEMPLATE),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A completed unit.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub bytes_transferred: u64,
    pub unit: WorkUnit,
}

/// Run `unit` on `client`, returning the number of bytes transferred.
pub async fn execute<C: ByteStream>(client: &mut C, settings: &TransferSettings, unit: &WorkUnit) -> Result<u64, Error> {
    match unit {
        WorkUnit::Download(unit) => download(client, &settings.download_template, unit).await,
        WorkUnit::Upload(unit) => upload(client, &settings.upload_template, unit, settings.chunk_size).await,
    }
}

/// Read the whole object and check its size.
pub async fn download<C: ByteStream>(client: &mut C, template: &ResourceTemplate, unit: &DownloadUnit) -> Result<u64, Error> {
    let resource_name = template.render(&unit.digest, unit.size, None);

    tracing::debug!("Downloading resource_name: {resource_name}");

    let mut stream = client.read(resource_name.clone()).await?;

    let mut read = 0;
    while let Some(chunk) = stream.try_next().await? {
        read += chunk.len() as u64;
    }

    if read != unit.size {
        return Err(Error::SizeMismatch {
            direction: Direction::Download,
            resource_name,
            expected: unit.size,
            actual: read,
        });
    }

    Ok(read)
}

/// Stream the source file followed by the unit's extra bytes, then check the committed size.
///
/// Chunks are sent strictly in order, each at the offset following the previous one. The finish flag is set on the
/// message carrying the last byte, or on a single empty message for an empty object.
pub async fn upload<C: ByteStream>(
    client: &mut C,
    template: &ResourceTemplate,
    unit: &UploadUnit,
    chunk_size: NonZeroUsize,
) -> Result<u64, Error> {
    let resource_name = template.render(&unit.digest, unit.size, Some(&Uuid::new_v4()));

    tracing::debug!("Uploading file: `{}` resource_name: {resource_name}", unit.source.path.display());

    let file = fs::File::open(&unit.source.path).await?;
    let reader = file.chain(&unit.extra[..]);

    let (sender, receiver) = mpsc::channel(1);

    let send = send_chunks(reader, resource_name.clone(), chunk_size.get(), sender);
    let (_, committed) = futures::try_join!(send, client.write(resource_name.clone(), receiver))?;

    if committed != unit.size {
        return Err(Error::SizeMismatch {
            direction: Direction::Upload,
            resource_name,
            expected: unit.size,
            actual: committed,
        });
    }

    Ok(committed)
}

async fn send_chunks<R: AsyncRead + Unpin>(
    mut reader: R,
    resource_name: String,
    chunk_size: usize,
    mut sender: mpsc::Sender<WriteChunk>,
) -> Result<(), Error> {
    let mut offset = 0;
    let mut current = read_chunk(&mut reader, chunk_size).await?;

    loop {
        // a short chunk means the reader is exhausted, otherwise look ahead to find out
        let next = if current.len() == chunk_size {
            read_chunk(&mut reader, chunk_size).await?
        } else {
            Bytes::new()
        };

        let finish = next.is_empty();
        let len = current.len() as u64;

        let chunk = WriteChunk {
            resource_name: resource_name.clone(),
            offset,
            data: current,
            finish,
        };

        if sender.send(chunk).await.is_err() {
            // the write stream has been dropped, its commit acknowledgment decides the outcome
            break;
        }

        offset += len;

        if finish {
            break;
        }

        current = next;
    }

    Ok(())
}

/// Read up to `chunk_size` bytes, fewer only at the end of `reader`.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, chunk_size: usize) -> io::Result<Bytes> {
    let mut buf = vec![0; chunk_size];
    let mut filled = 0;

    while filled < chunk_size {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }

    buf.truncate(filled);

    Ok(buf.into())
}
