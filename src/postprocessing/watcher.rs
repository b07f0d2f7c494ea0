//! Processes images as their records are inserted, without an HTTP trigger.

use super::ContentProcessor;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Run the processor for every id the stream yields, at most `workers` at a time.
///
/// Returns once the stream ends and all in-flight images are done, with
/// the number of images processed successfully.
pub async fn run_insert_listener<S>(ids: S, processor: Arc<ContentProcessor>, workers: usize) -> u64
where
    S: Stream<Item = String> + Send + Unpin,
{
    let workers = pool_size(workers);
    let semaphore = Arc::new(Semaphore::new(workers));
    let succeeded = Arc::new(AtomicU64::new(0));
    let mut ids = ids;

    info!(workers = workers, "Listening for inserted images");

    while let Some(image_id) = ids.next().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let processor = processor.clone();
        let succeeded = succeeded.clone();

        tokio::spawn(async move {
            debug!(image_id = %image_id, "Insert received");
            if processor.process_image(&image_id).await.is_ok() {
                succeeded.fetch_add(1, Ordering::Relaxed);
            }
            drop(permit);
        });
    }

    // Wait for in-flight work; pool_size keeps the count within u32
    if semaphore.acquire_many(workers as u32).await.is_err() {
        warn!("Worker pool closed before in-flight images completed");
    }

    let count = succeeded.load(Ordering::Relaxed);
    info!(processed = count, "Insert stream ended");
    count
}

/// Worker count usable both as semaphore permits and as one `acquire_many` request
fn pool_size(workers: usize) -> usize {
    workers.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize))
}
