//! This module provides the client side of the remote object-transfer service.
//!
//! The service exposes two streaming operations:
//! - `read`: a resource name in, a stream of binary chunks out;
//! - `write`: a stream of [`WriteChunk`]s in, the committed size out.
//!
//! Workers are generic over [`Connect`], so that every worker opens its own [`ByteStream`] client once and reuses it for
//! all of its work units.

use std::future::Future;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream};

use crate::Error;

pub mod grpc;
pub mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use grpc::GrpcConnector;
pub use http::HttpConnector;

/// One message of a write stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteChunk {
    pub resource_name: String,
    /// Offset of `data` within the object, equal to the number of bytes sent before it.
    pub offset: u64,
    pub data: Bytes,
    /// Set on the message carrying the last byte, or on an empty message for an empty object.
    pub finish: bool,
}

/// Chunks received from a read stream, in stream order.
pub type ReadStream = BoxStream<'static, Result<Bytes, Error>>;

/// A client to the remote service, exclusively owned by one worker.
pub trait ByteStream: Send + 'static {
    /// Open a read stream for `resource_name`.
    fn read(&mut self, resource_name: String) -> impl Future<Output = Result<ReadStream, Error>> + Send;

    /// Send a write stream for `resource_name` and return the committed size once the stream is exhausted.
    fn write<S>(&mut self, resource_name: String, chunks: S) -> impl Future<Output = Result<u64, Error>> + Send
    where
        S: Stream<Item = WriteChunk> + Send + 'static;
}

/// A factory of [`ByteStream`] clients.
pub trait Connect: Clone + Send + Sync + 'static {
    type Client: ByteStream;

    fn connect(&self) -> impl Future<Output = Result<Self::Client, Error>> + Send;
}
