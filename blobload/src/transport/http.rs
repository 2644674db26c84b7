//! Object transfers over plain HTTP, for caches exposing `GET`/`PUT`/`HEAD` on their resources.
//!
//! Resource names are resolved against a base URL, e.g. `http://localhost:8080/` with the `cas/{sha256}` template.
//! Write chunks are streamed as the `PUT` request body, and the committed size is the `Content-Length` the server
//! reports for the resource right after.

use futures::stream::{Stream, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client};
use tokio::io;
use url::Url;

use super::{ByteStream, Connect, ReadStream, WriteChunk};
use crate::Error;

#[derive(Debug, Clone)]
pub struct HttpConnector {
    base: Url,
}

impl HttpConnector {
    pub fn new(addr: &str) -> Result<Self, Error> {
        let mut base = Url::parse(addr).map_err(|err| Error::connection(addr, err))?;

        // make `join()` append resource names instead of replacing the last path segment
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self { base })
    }
}

impl Connect for HttpConnector {
    type Client = HttpClient;

    async fn connect(&self) -> Result<HttpClient, Error> {
        let client = Client::builder()
            .build()
            .map_err(|err| Error::connection(self.base.as_str(), err))?;

        Ok(HttpClient {
            client,
            base: self.base.clone(),
        })
    }
}

#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    base: Url,
}

impl HttpClient {
    #[inline]
    fn url(&self, resource_name: &str) -> Result<Url, Error> {
        self.base.join(resource_name).map_err(|err| Error::transfer(resource_name, err))
    }
}

impl ByteStream for HttpClient {
    async fn read(&mut self, resource_name: String) -> Result<ReadStream, Error> {
        let url = self.url(&resource_name)?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::transfer(&resource_name, err))?;

        Ok(resp
            .bytes_stream()
            .map_err(move |err| Error::transfer(&resource_name, err))
            .boxed())
    }

    async fn write<S>(&mut self, resource_name: String, chunks: S) -> Result<u64, Error>
    where
        S: Stream<Item = WriteChunk> + Send + 'static,
    {
        let url = self.url(&resource_name)?;
        let body = Body::wrap_stream(chunks.map(|chunk| Ok::<_, io::Error>(chunk.data)));

        self.client
            .put(url.clone())
            .body(body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::transfer(&resource_name, err))?;

        let resp = self
            .client
            .head(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| Error::transfer(&resource_name, err))?;

        resp.headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| Error::transfer(&resource_name, "missing committed Content-Length"))
    }
}
