//! In-process stand-in for the remote service.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};

use super::{ByteStream, Connect, ReadStream, WriteChunk};
use crate::Error;

const READ_CHUNK: usize = 1000;

#[derive(Debug, Default)]
struct Inner {
    blobs: Mutex<HashMap<String, Bytes>>,
    writes: Mutex<Vec<WriteChunk>>,
    connections: AtomicUsize,
    reads: AtomicUsize,
    read_limit: Option<usize>,
    commit_limit: Option<u64>,
    write_delay: Option<Duration>,
}

/// Objects are keyed by the part of the resource name following its last `blobs/` segment, so that upload and
/// download templates of the same object meet.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryService {
    inner: Arc<Inner>,
}

impl MemoryService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Truncate every read stream to `limit` bytes.
    pub(crate) fn with_read_limit(mut self, limit: usize) -> Self {
        Arc::get_mut(&mut self.inner).expect("service not shared yet").read_limit = Some(limit);
        self
    }

    /// Never acknowledge more than `limit` bytes.
    pub(crate) fn with_commit_limit(mut self, limit: u64) -> Self {
        Arc::get_mut(&mut self.inner).expect("service not shared yet").commit_limit = Some(limit);
        self
    }

    /// Hold every write for `delay` before committing it.
    pub(crate) fn with_write_delay(mut self, delay: Duration) -> Self {
        Arc::get_mut(&mut self.inner).expect("service not shared yet").write_delay = Some(delay);
        self
    }

    pub(crate) fn insert(&self, resource_name: &str, data: impl Into<Bytes>) {
        self.inner.blobs.lock().unwrap().insert(blob_key(resource_name).to_owned(), data.into());
    }

    pub(crate) fn get(&self, resource_name: &str) -> Option<Bytes> {
        self.inner.blobs.lock().unwrap().get(blob_key(resource_name)).cloned()
    }

    pub(crate) fn blob_count(&self) -> usize {
        self.inner.blobs.lock().unwrap().len()
    }

    /// Every write message received so far, in arrival order.
    pub(crate) fn writes(&self) -> Vec<WriteChunk> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub(crate) fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }
}

fn blob_key(resource_name: &str) -> &str {
    match resource_name.rfind("blobs/") {
        Some(i) => &resource_name[i + "blobs/".len()..],
        None => resource_name,
    }
}

impl Connect for MemoryService {
    type Client = MemoryClient;

    async fn connect(&self) -> Result<MemoryClient, Error> {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryClient { service: self.clone() })
    }
}

#[derive(Debug)]
pub(crate) struct MemoryClient {
    service: MemoryService,
}

impl ByteStream for MemoryClient {
    async fn read(&mut self, resource_name: String) -> Result<ReadStream, Error> {
        let inner = &self.service.inner;
        inner.reads.fetch_add(1, Ordering::SeqCst);

        let mut data = self
            .service
            .get(&resource_name)
            .ok_or_else(|| Error::transfer(&resource_name, "not found"))?;

        if let Some(limit) = inner.read_limit {
            data.truncate(limit);
        }

        let chunks: Vec<_> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|start| Ok(data.slice(start..data.len().min(start + READ_CHUNK))))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }

    async fn write<S>(&mut self, resource_name: String, chunks: S) -> Result<u64, Error>
    where
        S: Stream<Item = WriteChunk> + Send + 'static,
    {
        let mut chunks = pin!(chunks);
        let mut received = BytesMut::new();
        let mut finished = false;

        while let Some(chunk) = chunks.next().await {
            self.service.inner.writes.lock().unwrap().push(chunk.clone());

            if finished {
                return Err(Error::transfer(&resource_name, "message after finish_write"));
            }
            if chunk.resource_name != resource_name {
                return Err(Error::transfer(&resource_name, "resource name changed mid-stream"));
            }
            if chunk.offset != received.len() as u64 {
                return Err(Error::transfer(&resource_name, format!("unexpected offset {}", chunk.offset)));
            }

            received.extend_from_slice(&chunk.data);
            finished = chunk.finish;
        }

        if !finished {
            return Err(Error::transfer(&resource_name, "stream closed without finish_write"));
        }

        if let Some(delay) = self.service.inner.write_delay {
            tokio::time::sleep(delay).await;
        }

        let committed = received.len() as u64;
        self.service.insert(&resource_name, received.freeze());

        Ok(self.service.inner.commit_limit.map_or(committed, |limit| committed.min(limit)))
    }
}
