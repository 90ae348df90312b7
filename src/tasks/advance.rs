use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::index::Snapshot;
use crate::link::{CastLink, CastTransport};
use crate::rotate::Rotator;
use crate::web::{MediaUrl, content_type_for};

/// Periodically advance the slideshow: read the latest snapshot, step the
/// rotator, and push the photo's URL at the device.
///
/// The cursor advances even while the device is away, so the slideshow
/// catches up the moment the link reconnects. An empty index skips the tick
/// with a notice; no load is attempted.
pub async fn run<T: CastTransport>(
    link: Arc<CastLink<T>>,
    snapshots: watch::Receiver<Snapshot>,
    urls: MediaUrl,
    period: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut rotator = Rotator::new();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting advance task");
                break;
            }

            _ = ticker.tick() => {
                let snapshot = snapshots.borrow().clone();
                let Some(path) = rotator.advance(&snapshot) else {
                    info!(generation = snapshot.generation(), "photo index is empty; skipping rotation");
                    continue;
                };
                let Some(url) = urls.url_for(path) else {
                    warn!(path = %path.display(), "photo path escapes the library root; skipping");
                    continue;
                };
                let content_type = content_type_for(path).unwrap_or("application/octet-stream");
                debug!(url = %url, "advancing slideshow");
                link.load_media(&url, content_type).await;
            }
        }
    }
    Ok(())
}
