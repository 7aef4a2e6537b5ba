//! The in-memory snapshot of image records.
//!
//! Every request reads the snapshot; a linear scan over it answers all
//! gallery queries without touching the store. The snapshot is replaced
//! wholesale: readers either see the previous complete list or the new
//! one, never a partial load. Refresh happens on an elapsed interval or
//! when the generator's change signal moves; a failed reload keeps the
//! previous snapshot so a transient store outage degrades to stale reads.

use catalog::records::{ImageRecord, VersionCutovers, PROJECTION_FIELDS};
use catalog::signal::ChangeSignal;
use catalog::store::{StoreError, Table};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

struct Inner {
    records: Arc<Vec<ImageRecord>>,
    loaded_at: Option<Instant>,
    /// Last change-signal marker this process acted on.
    last_signal: Option<String>,
}

pub struct SnapshotCache {
    table: Arc<dyn Table>,
    signal: Arc<dyn ChangeSignal>,
    cutovers: VersionCutovers,
    refresh_interval: Duration,
    inner: RwLock<Inner>,
}

impl SnapshotCache {
    pub fn new(
        table: Arc<dyn Table>,
        signal: Arc<dyn ChangeSignal>,
        cutovers: VersionCutovers,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            table,
            signal,
            cutovers,
            refresh_interval,
            inner: RwLock::new(Inner {
                records: Arc::new(Vec::new()),
                loaded_at: None,
                last_signal: None,
            }),
        }
    }

    /// The current snapshot. Cheap: clones an `Arc`, not the records.
    pub fn snapshot(&self) -> Arc<Vec<ImageRecord>> {
        self.inner.read().unwrap().records.clone()
    }

    /// True when the snapshot should be reloaded: never loaded, the refresh
    /// interval elapsed, or the change signal moved since this process last
    /// observed it. An observed signal is consumed exactly once: the
    /// marker is recorded here, so a failed reload does not re-trigger.
    pub async fn needs_refresh(&self) -> bool {
        {
            let inner = self.inner.read().unwrap();
            match inner.loaded_at {
                None => return true,
                Some(loaded_at) if loaded_at.elapsed() >= self.refresh_interval => return true,
                Some(_) => {}
            }
        }

        // A signal fetch failure is not a reason to reload.
        let marker = match self.signal.current().await {
            Ok(marker) => marker,
            Err(e) => {
                warn!(error = %e, "Failed to read change signal");
                return false;
            }
        };

        let mut inner = self.inner.write().unwrap();
        if marker.is_some() && marker != inner.last_signal {
            debug!(marker = ?marker, "Change signal observed");
            inner.last_signal = marker;
            return true;
        }
        false
    }

    /// Fetch the filter projection for every record and swap the snapshot.
    /// On failure the previous snapshot is retained and the error is
    /// returned to the caller as retryable.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), StoreError> {
        let items = self.table.get_keys(PROJECTION_FIELDS).await?;

        let mut records = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for item in &items {
            match ImageRecord::from_item(item, &self.cutovers) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "Skipped records violating snapshot invariants");
        }

        info!(count = records.len(), "Loaded image snapshot");
        metrics::counter!("gallery.snapshot.refresh").increment(1);
        metrics::gauge!("gallery.snapshot.records").set(records.len() as f64);

        let mut inner = self.inner.write().unwrap();
        inner.records = Arc::new(records);
        inner.loaded_at = Some(Instant::now());
        Ok(())
    }

    /// Reload if stale; a failed reload is logged and the previous snapshot
    /// keeps serving.
    pub async fn refresh_if_stale(&self) {
        if self.needs_refresh().await {
            if let Err(e) = self.load().await {
                metrics::counter!("gallery.snapshot.refresh_failures").increment(1);
                warn!(error = %e, retryable = e.is_retryable(), "Snapshot reload failed, serving stale data");
            }
        }
    }

    /// Force the next `needs_refresh` to report true.
    pub fn invalidate(&self) {
        self.inner.write().unwrap().loaded_at = None;
    }
}
