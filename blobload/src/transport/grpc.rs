//! `google.bytestream.ByteStream` client over gRPC.

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use super::{ByteStream, Connect, ReadStream, WriteChunk};
use crate::Error;

const READ_PATH: &str = "/google.bytestream.ByteStream/Read";
const WRITE_PATH: &str = "/google.bytestream.ByteStream/Write";

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadRequest {
    #[prost(string, tag = "1")]
    pub resource_name: String,
    #[prost(int64, tag = "2")]
    pub read_offset: i64,
    /// `0` means no limit.
    #[prost(int64, tag = "3")]
    pub read_limit: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadResponse {
    #[prost(bytes = "bytes", tag = "10")]
    pub data: Bytes,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    #[prost(string, tag = "1")]
    pub resource_name: String,
    #[prost(int64, tag = "2")]
    pub write_offset: i64,
    #[prost(bool, tag = "3")]
    pub finish_write: bool,
    #[prost(bytes = "bytes", tag = "10")]
    pub data: Bytes,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteResponse {
    #[prost(int64, tag = "1")]
    pub committed_size: i64,
}

impl From<WriteChunk> for WriteRequest {
    fn from(chunk: WriteChunk) -> Self {
        Self {
            resource_name: chunk.resource_name,
            // offsets never exceed the size of a local file
            write_offset: chunk.offset as i64,
            finish_write: chunk.finish,
            data: chunk.data,
        }
    }
}

/// Opens one plaintext HTTP/2 channel per client.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    addr: String,
}

impl GrpcConnector {
    /// `addr` is either `host:port` or a full `http://host:port` URI.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    fn uri(&self) -> String {
        if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("http://{}", self.addr)
        }
    }
}

impl Connect for GrpcConnector {
    type Client = GrpcClient;

    async fn connect(&self) -> Result<GrpcClient, Error> {
        let endpoint = Endpoint::from_shared(self.uri()).map_err(|err| Error::connection(&self.addr, err))?;
        let channel = endpoint.connect().await.map_err(|err| Error::connection(&self.addr, err))?;

        tracing::debug!("Connected to `{}`", self.addr);

        Ok(GrpcClient {
            addr: self.addr.clone(),
            inner: tonic::client::Grpc::new(channel),
        })
    }
}

#[derive(Debug)]
pub struct GrpcClient {
    addr: String,
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcClient {
    async fn ready(&mut self) -> Result<(), Error> {
        self.inner.ready().await.map_err(|err| Error::connection(&self.addr, err))
    }
}

impl ByteStream for GrpcClient {
    async fn read(&mut self, resource_name: String) -> Result<ReadStream, Error> {
        self.ready().await?;

        let request = ReadRequest {
            resource_name: resource_name.clone(),
            ..Default::default()
        };

        let response = self
            .inner
            .server_streaming(
                tonic::Request::new(request),
                PathAndQuery::from_static(READ_PATH),
                ProstCodec::<ReadRequest, ReadResponse>::default(),
            )
            .await
            .map_err(|status| Error::transfer(&resource_name, status))?;

        Ok(response
            .into_inner()
            .map(move |message| message.map(|message| message.data).map_err(|status| Error::transfer(&resource_name, status)))
            .boxed())
    }

    async fn write<S>(&mut self, resource_name: String, chunks: S) -> Result<u64, Error>
    where
        S: Stream<Item = WriteChunk> + Send + 'static,
    {
        self.ready().await?;

        let response = self
            .inner
            .client_streaming(
                tonic::Request::new(chunks.map(WriteRequest::from)),
                PathAndQuery::from_static(WRITE_PATH),
                ProstCodec::<WriteRequest, WriteResponse>::default(),
            )
            .await
            .map_err(|status| Error::transfer(&resource_name, status))?;

        let committed_size = response.into_inner().committed_size;

        u64::try_from(committed_size)
            .map_err(|_| Error::transfer(&resource_name, format!("negative committed size {committed_size}")))
    }
}
