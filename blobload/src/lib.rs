//! A load generator for remote content-addressable blob stores.
//!
//! It measures upload and download throughput against a service speaking a streaming object-transfer protocol
//! (`google.bytestream.ByteStream` over gRPC, or plain HTTP), and is dedicated to:
//! - scanning a directory into a flat, read-only inventory of files and their SHA-256 digests,
//! - expanding that inventory into download and upload work units,
//! - draining those units with a fixed-size pool of workers, each owning its own client,
//! - aggregating completions into cumulative throughput observations.
//!
//! Uploaded objects must be distinct on every iteration while still being verifiable by their digest. Each upload
//! iteration therefore appends a fresh random suffix to the base files, and derives the new digests by resuming the
//! serialized SHA-256 state of every file instead of hashing its content again:
//!
//! ```text
//!     digest(file ++ suffix) == extend(state_after(file), suffix)
//! ```
//!
//! A run goes through the following steps:
//!
//! ```text
//!     scan root ─▶ seed base files ─┬─▶ download units ─▶ queue ─▶ N workers ─▶ completions ─▶ throughput
//!                                   └─▶ upload units   ─▶ queue ─▶ N workers ─▶ completions ─▶ throughput
//! ```
//!
//! Both benchmark phases run concurrently, each with its own pool, queue and aggregator. Any error other than a
//! failure to walk a directory entry aborts the whole run: a load test silently skipping failed transfers would
//! report misleading numbers. There is no retry.

mod error;
pub use error::*;

pub mod bench;
pub mod config;
pub mod digest;
pub mod inventory;
pub mod task;
pub mod throughput;
pub mod transfer;
pub mod transport;
pub mod workload;

pub use bench::{run, run_remote, Outcome};
pub use config::{Config, Transport};
