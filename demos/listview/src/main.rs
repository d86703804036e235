//! Simulated list view scrolled over remote thumbnails.
//!
//! Each visible row is a target; scrolling rebinds rows to new keys, so
//! older in-flight loads get superseded exactly like in a real UI list.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use loupe_core::prelude::*;
use loupe_observe::{LoggerConfig, logger_init};

const ROWS: usize = 4;
const ITEMS: usize = 16;

/// Toy two-tier cache: `fast` is the memory tier, `slow` pretends to be
/// a disk tier by sleeping on lookups.
#[derive(Clone, Default)]
struct ThumbCache {
    fast: Arc<Mutex<HashMap<String, Arc<String>>>>,
    slow: Arc<Mutex<HashMap<String, Arc<String>>>>,
}

impl CacheTier<String, String> for ThumbCache {
    fn get_fast(&self, key: &String) -> Option<Arc<String>> {
        self.fast.lock().get(key).cloned()
    }

    fn get_slow(&self, key: &String) -> Option<Arc<String>> {
        thread::sleep(Duration::from_millis(5));
        self.slow.lock().get(key).cloned()
    }

    fn put(&self, key: &String, artifact: Arc<String>) {
        self.fast.lock().insert(key.clone(), Arc::clone(&artifact));
        self.slow.lock().insert(key.clone(), artifact);
    }
}

fn render_row(rows: &[TargetId], key: &String, target: TargetId, artifact: &str) {
    match rows.iter().position(|r| *r == target) {
        Some(row) => info!(row, %key, %artifact, "render"),
        // No row is bound to the target anymore; nothing to paint.
        None => debug!(%key, "render skipped, target unbound"),
    }
}

/// Pretend network fetch + decode.
fn fetch_thumbnail(key: &String) -> Result<String, BoxError> {
    debug!(%key, "fetching");
    thread::sleep(Duration::from_millis(40));
    Ok(format!("img:{key}"))
}

fn main() -> anyhow::Result<()> {
    // 1) Logger
    logger_init(&LoggerConfig::default())?;
    info!("logger initialized");

    // 2) Loader: 2 workers, toy cache, url data source
    let urls: Vec<String> = (0..ITEMS).map(|n| format!("photo-{n}")).collect();
    let (loader, deliveries) = Loader::builder(fetch_thumbnail)
        .config(PoolConfig::new().with_workers(2))
        .cache(ThumbCache::default())
        .data_source(urls)
        .build();
    info!("loader ready");

    // 3) Rows of the "list view"
    let rows: Vec<TargetId> = (0..ROWS).map(|_| TargetId::new()).collect();

    // 4) Scroll: each step rebinds every row to the next window of items.
    //    Fast enough that most loads are superseded before they deliver.
    for step in 0..ITEMS - ROWS {
        for (row, target) in rows.iter().enumerate() {
            match loader.load_index(step + row, *target)? {
                LoadOutcome::Hit(artifact) => info!(row, %artifact, "render (cache hit)"),
                LoadOutcome::InFlight(_) => debug!(row, "already loading"),
                LoadOutcome::Queued(handle) => debug!(row, key = %handle.key(), "queued"),
            }
        }

        // The consumer thread drains deliveries between scroll steps.
        deliveries.drain(|key, target, artifact| render_row(&rows, key, target, &artifact));
        thread::sleep(Duration::from_millis(25));
    }

    // 5) Settle: let the last window finish and drain the tail.
    info!("scroll finished, draining");
    while deliveries.next_timeout(Duration::from_millis(200), |key, target, artifact| {
        render_row(&rows, key, target, &artifact)
    }) {}

    // 6) Shut down, letting queued work finish.
    loader.shutdown(true);
    deliveries.drain(|key, _target, artifact| {
        info!(%key, %artifact, "render (late)");
    });
    info!("done");

    Ok(())
}
