//! Streams selected entries from one backend to another.
//!
//! Each selected entry is planned (directories are walked, parents first),
//! then copied chunk by chunk while a ticker reports throughput as
//! `speed_update`. A failed entry is recorded and the rest continue; a moved
//! entry's source is deleted only after all of it arrived. Cancellation is
//! checked between chunks and ends the run without a terminal event, since
//! the cancel handler already answered the client.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use turbofile_core::dto::FailedItem;
use turbofile_core::event::{CompleteStatus, SpeedUpdate, StartTransfer, TransferRoute};
use turbofile_core::transfer::progress::{format_hms, format_size};
use turbofile_core::{RemotePath, ServerEvent, TransferFile, TransferMode};

use crate::backend::{remove_tree, walk, Backend, BackendError, BackendResult};
use crate::config::TransferSettings;
use crate::listing::ListingCache;

pub struct TransferJob {
    pub transfer_id: String,
    pub request: StartTransfer,
    pub source: Arc<dyn Backend>,
    pub target: Arc<dyn Backend>,
}

impl TransferJob {
    fn same_server(&self) -> bool {
        self.request.source_server == self.request.target_server
    }

    fn verb(&self) -> &'static str {
        match self.request.mode {
            TransferMode::Copy => "Copying",
            TransferMode::Move => "Moving",
        }
    }
}

/// One filesystem object to create on the target.
struct Item {
    source: RemotePath,
    target: RemotePath,
    is_dir: bool,
}

#[derive(Clone)]
pub struct TransferEngine {
    listings: Arc<ListingCache>,
    settings: TransferSettings,
}

impl TransferEngine {
    pub fn new(listings: Arc<ListingCache>, settings: TransferSettings) -> Self {
        Self { listings, settings }
    }

    pub async fn run(
        &self,
        job: TransferJob,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let id = job.transfer_id.clone();
        let emit = |event: ServerEvent| {
            let _ = events.send(event);
        };
        let log = |message: String| {
            let _ = events.send(ServerEvent::TransferLog {
                transfer_id: id.clone(),
                message,
            });
        };

        let count = job.request.source_files.len();
        tracing::info!(
            transfer_id = %id,
            source = %job.request.source_server,
            target = %job.request.target_server,
            mode = ?job.request.mode,
            count,
            "transfer started"
        );
        emit(ServerEvent::TransferStarted {
            transfer_id: id.clone(),
            message: Some(format!("{} {count} item(s)", job.verb())),
        });
        log(format!(
            "📋 {} {count} item(s) to {}:{}",
            job.verb(),
            job.request.target_server,
            job.request.target_path
        ));

        let started = Instant::now();
        let bytes = Arc::new(AtomicU64::new(0));
        let ticker_done = cancel.child_token();
        let ticker = tokio::spawn(speed_ticker(
            self.speed_update(&job, 0, started),
            Arc::clone(&bytes),
            started,
            self.settings.speed_interval(),
            ticker_done.clone(),
            events.clone(),
        ));

        let mut failed = Vec::new();
        let mut cancelled = false;
        for file in &job.request.source_files {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.transfer_one(&job, file, &bytes, &cancel).await {
                Ok(()) => log(format!("✅ {}", file.path.file_name())),
                Err(BackendError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(transfer_id = %id, path = %file.path, "transfer item failed: {e}");
                    log(format!("❌ {}: {e}", file.path));
                    failed.push(FailedItem {
                        path: file.path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        ticker_done.cancel();
        let _ = ticker.await;
        self.invalidate(&job);

        if cancelled || cancel.is_cancelled() {
            tracing::info!(transfer_id = %id, "transfer cancelled");
            return;
        }

        let total = bytes.load(Ordering::Relaxed);
        emit(ServerEvent::SpeedUpdate(self.speed_update(&job, total, started)));

        let elapsed = started.elapsed().as_secs();
        let succeeded = count - failed.len();
        let (status, message) = if failed.is_empty() {
            (
                CompleteStatus::Success,
                format!("{succeeded} item(s) transferred ({})", format_size(total as f64)),
            )
        } else if succeeded > 0 {
            (
                CompleteStatus::PartialSuccess,
                format!("{succeeded} of {count} item(s) transferred, {} failed", failed.len()),
            )
        } else {
            let reason = failed
                .first()
                .map(|f| f.error.clone())
                .unwrap_or_else(|| "nothing to transfer".to_string());
            (CompleteStatus::Failure, reason)
        };
        tracing::info!(transfer_id = %id, ?status, bytes = total, secs = elapsed, "transfer finished");
        emit(ServerEvent::TransferComplete {
            transfer_id: id.clone(),
            status,
            message: Some(message),
            total_time: Some(format_hms(elapsed)),
            failed_items: failed,
        });
    }

    async fn transfer_one(
        &self,
        job: &TransferJob,
        file: &TransferFile,
        bytes: &AtomicU64,
        cancel: &CancellationToken,
    ) -> BackendResult<()> {
        let (source, target) = (job.source.as_ref(), job.target.as_ref());
        let name = file.path.file_name();
        if name.is_empty() {
            return Err(BackendError::Unsupported("cannot transfer a root directory".into()));
        }
        let destination = job.request.target_path.join(name);
        if job.same_server() {
            if destination == file.path {
                return Err(BackendError::Unsupported(
                    "source and destination are the same".into(),
                ));
            }
            if file.path.contains(&job.request.target_path) {
                return Err(BackendError::Unsupported(format!(
                    "cannot transfer {} into itself",
                    file.path
                )));
            }
        }

        let entry = source.stat(&file.path).await?;
        if job.same_server() && job.request.mode == TransferMode::Move {
            match source.rename(&file.path, &destination).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(path = %file.path, "rename failed, copying instead: {e}");
                }
            }
        }

        let mut items = vec![Item {
            source: file.path.clone(),
            target: destination.clone(),
            is_dir: entry.is_dir(),
        }];
        if entry.is_dir() {
            let base = file.path.as_str();
            for child in walk(source, &file.path).await? {
                let relative = child
                    .path()
                    .as_str()
                    .strip_prefix(base)
                    .unwrap_or_else(|| child.name())
                    .trim_start_matches('/');
                items.push(Item {
                    source: child.path().clone(),
                    target: destination.join(relative),
                    is_dir: child.is_dir(),
                });
            }
        }

        for item in &items {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            if item.is_dir {
                if !target.exists(&item.target).await? {
                    target.mkdir(&item.target).await?;
                }
                continue;
            }
            if let Err(e) = self
                .copy_file(source, target, &item.source, &item.target, bytes, cancel)
                .await
            {
                if matches!(e, BackendError::Cancelled) {
                    let _ = target.remove_file(&item.target).await;
                }
                return Err(e);
            }
        }

        if job.request.mode == TransferMode::Move {
            remove_tree(source, &file.path).await?;
        }
        Ok(())
    }

    async fn copy_file(
        &self,
        source: &dyn Backend,
        target: &dyn Backend,
        from: &RemotePath,
        to: &RemotePath,
        bytes: &AtomicU64,
        cancel: &CancellationToken,
    ) -> BackendResult<()> {
        let mut reader = source.open_read(from).await?;
        let mut writer = target.open_write(to).await?;
        let mut buf = vec![0u8; self.settings.chunk_size()];
        loop {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            bytes.fetch_add(n as u64, Ordering::Relaxed);
        }
        writer.shutdown().await?;
        Ok(())
    }

    fn invalidate(&self, job: &TransferJob) {
        self.listings
            .invalidate(&job.request.target_server, &job.request.target_path);
        if job.request.mode == TransferMode::Move {
            let parents: BTreeSet<RemotePath> = job
                .request
                .source_files
                .iter()
                .map(|f| f.path.parent())
                .collect();
            for parent in parents {
                self.listings.invalidate(&job.request.source_server, &parent);
            }
        }
    }

    fn speed_update(&self, job: &TransferJob, total: u64, started: Instant) -> SpeedUpdate {
        let secs = started.elapsed().as_secs_f64();
        let speed = if secs > 0.0 { total as f64 / secs } else { 0.0 };
        SpeedUpdate {
            transfer_id: job.transfer_id.clone(),
            speed: Some(format!("{}/s", format_size(speed))),
            elapsed_time: Some(format_hms(started.elapsed().as_secs())),
            transferred_bytes: Some(total),
            transferred_human: Some(format_size(total as f64)),
            source_server: Some(job.request.source_server.clone()),
            target_server: Some(job.request.target_server.clone()),
            transfer_mode: Some(TransferRoute::from_locality(
                job.source.is_local(),
                job.target.is_local(),
            )),
        }
    }
}

/// Sends a `speed_update` every `interval` with the throughput since the
/// previous tick.
async fn speed_ticker(
    template: SpeedUpdate,
    bytes: Arc<AtomicU64>,
    started: Instant,
    interval: std::time::Duration,
    done: CancellationToken,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut ticks = tokio::time::interval_at(started + interval, interval);
    let (mut last_bytes, mut last_at) = (0u64, started);
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticks.tick() => {
                let now = Instant::now();
                let total = bytes.load(Ordering::Relaxed);
                let window = now.duration_since(last_at).as_secs_f64();
                let rate = if window > 0.0 {
                    total.saturating_sub(last_bytes) as f64 / window
                } else {
                    0.0
                };
                let update = SpeedUpdate {
                    speed: Some(format!("{}/s", format_size(rate))),
                    elapsed_time: Some(format_hms(now.duration_since(started).as_secs())),
                    transferred_bytes: Some(total),
                    transferred_human: Some(format_size(total as f64)),
                    ..template.clone()
                };
                if events.send(ServerEvent::SpeedUpdate(update)).is_err() {
                    break;
                }
                last_bytes = total;
                last_at = now;
            }
        }
    }
}
