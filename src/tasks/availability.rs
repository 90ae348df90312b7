use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::link::{CastLink, CastTransport};

/// Periodically probe the device and drive the cast link's state machine.
///
/// All reconnection policy lives here; the advance task only ever issues
/// best-effort loads against whatever state this task has established.
pub async fn run<T: CastTransport>(
    link: Arc<CastLink<T>>,
    period: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting availability task");
                break;
            }
            _ = ticker.tick() => link.check_availability().await,
        }
    }
    Ok(())
}
