use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::select;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::{Configuration, PhotoOrdering};
use crate::index::{Snapshot, scan_library};

/// Periodically rebuild the photo index and publish each complete snapshot.
///
/// A failed scan (root unmounted, permission change) keeps the previous
/// snapshot in place so the slideshow continues on stale data instead of
/// going dark.
#[instrument(
    skip(cfg, snapshots, cancel),
    fields(root = %cfg.photo_library_path.display(), blacklist = %cfg.blacklist)
)]
pub async fn run(
    cfg: Configuration,
    snapshots: watch::Sender<Snapshot>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut generation = snapshots.borrow().generation();
    let mut rng = cfg.shuffle_seed.map(StdRng::seed_from_u64);
    let mut ticker = interval(cfg.photo_index_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting indexer task");
                break;
            }

            _ = ticker.tick() => {
                match scan_library(&cfg.photo_library_path, &cfg.blacklist) {
                    Ok(mut paths) => {
                        if cfg.ordering == PhotoOrdering::Shuffled {
                            match rng.as_mut() {
                                Some(rng) => paths.shuffle(rng),
                                None => paths.shuffle(&mut rand::rng()),
                            }
                        }
                        generation += 1;
                        let snapshot = Snapshot::new(generation, paths);
                        info!(generation, count = snapshot.len(), "published photo index");
                        if snapshots.send(snapshot).is_err() {
                            warn!("no snapshot readers remain; exiting indexer task");
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "library scan failed; keeping previous snapshot");
                    }
                }
            }
        }
    }
    Ok(())
}
