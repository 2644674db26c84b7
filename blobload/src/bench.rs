//! This module runs a whole load test: scan, seed the remote service, then run the benchmark phases.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use humansize::{format_size, DECIMAL};
use tokio::sync::mpsc;

use crate::config::{Config, Transport};
use crate::inventory::Inventory;
use crate::task::{Pool, Queue};
use crate::throughput::{PhaseSummary, Throughput};
use crate::transfer::{self, TransferResult, TransferSettings};
use crate::transport::{Connect, GrpcConnector, HttpConnector};
use crate::workload::{self, UploadUnit, WorkUnit};
use crate::{Direction, Error};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The root directory holds no regular file, nothing was sent.
    NoFiles,
    Completed {
        download: Option<PhaseSummary>,
        upload: Option<PhaseSummary>,
    },
}

/// Run against the remote service selected by `config`.
pub async fn run_remote(config: &Config) -> Result<Outcome, Error> {
    config.validate()?;

    match config.transport {
        Transport::Grpc => run(config, GrpcConnector::new(&config.addr)).await,
        Transport::Http => run(config, HttpConnector::new(&config.addr)?).await,
    }
}

/// Run a load test, using `connector` for every client.
pub async fn run<C: Connect>(config: &Config, connector: C) -> Result<Outcome, Error> {
    config.validate()?;

    let root = config.root.clone();

    tracing::info!("Scanning files in: `{}`", root.display());

    let inventory = tokio::task::spawn_blocking(move || Inventory::scan(root)).await??;

    if inventory.is_empty() {
        tracing::info!("No files found");

        return Ok(Outcome::NoFiles);
    }

    tracing::info!("Found {} files, {}", inventory.len(), format_size(inventory.total_size(), DECIMAL));

    let settings = Arc::new(config.transfer_settings());

    seed(&connector, &settings, &inventory).await?;

    let downloads: Vec<WorkUnit> = workload::build_download_units(inventory.files(), config.download_iterations)
        .into_iter()
        .map(WorkUnit::from)
        .collect();

    let uploads: Vec<WorkUnit> = {
        let mut rng = rand::thread_rng();

        workload::build_upload_units(inventory.files(), config.upload_iterations, config.suffix_len, &mut rng)?
            .into_iter()
            .map(WorkUnit::from)
            .collect()
    };

    let download = optional_phase(Direction::Download, &connector, &settings, downloads, config.parallel);
    let upload = optional_phase(Direction::Upload, &connector, &settings, uploads, config.parallel);

    let (download, upload) = futures::try_join!(download, upload)?;

    Ok(Outcome::Completed { download, upload })
}

/// Upload every file once, unmodified, so that downloads find them.
async fn seed<C: Connect>(connector: &C, settings: &TransferSettings, inventory: &Inventory) -> Result<(), Error> {
    let start = Instant::now();
    let mut client = connector.connect().await?;

    for file in inventory.files() {
        let unit = UploadUnit::unmodified(Arc::clone(file));

        transfer::upload(&mut client, &settings.upload_template, &unit, settings.chunk_size).await?;
    }

    tracing::info!("Uploaded base files in {:.2?}", start.elapsed());

    Ok(())
}

async fn optional_phase<C: Connect>(
    direction: Direction,
    connector: &C,
    settings: &Arc<TransferSettings>,
    units: Vec<WorkUnit>,
    parallel: NonZeroUsize,
) -> Result<Option<PhaseSummary>, Error> {
    if units.is_empty() {
        return Ok(None);
    }

    run_phase(direction, connector, settings, units, parallel).await.map(Some)
}

/// Run `units` on a pool of `parallel` workers, each with its own client, and aggregate their completions.
pub async fn run_phase<C: Connect>(
    direction: Direction,
    connector: &C,
    settings: &Arc<TransferSettings>,
    units: Vec<WorkUnit>,
    parallel: NonZeroUsize,
) -> Result<PhaseSummary, Error> {
    let total_size: u64 = units.iter().map(WorkUnit::size).sum();
    let queue = Arc::new(Queue::new(units));
    let (completed, mut completions) = mpsc::channel(queue.len().max(1));

    tracing::info!(
        "{direction} starting {} transfers, {} total, on {parallel} workers",
        queue.len(),
        format_size(total_size, DECIMAL)
    );

    let start = Instant::now();

    let pool = Pool::start(parallel, |id| {
        let connector = connector.clone();
        let settings = Arc::clone(settings);
        let queue = Arc::clone(&queue);
        let completed = completed.clone();

        async move {
            let mut client = connector.connect().await?;

            while let Some(unit) = queue.pop().await {
                let bytes_transferred = transfer::execute(&mut client, &settings, &unit).await?;

                // the completion channel is sized to hold every unit
                let _ = completed
                    .send(TransferResult {
                        bytes_transferred,
                        unit,
                    })
                    .await;
            }

            tracing::info!("{direction} client {id} finished");

            Ok(())
        }
    });

    // completions end once every worker is done with its sender
    drop(completed);

    let aggregate = async {
        let mut throughput = Throughput::new(direction, queue.len(), start);

        while let Some(result) = completions.recv().await {
            let observation = throughput.record(result.bytes_transferred, Instant::now());

            tracing::info!("{observation}");
        }

        Ok::<_, Error>(throughput.summary(Instant::now()))
    };

    let ((), summary) = futures::try_join!(pool.join(), aggregate)?;

    tracing::info!("{summary}");

    Ok(summary)
}
