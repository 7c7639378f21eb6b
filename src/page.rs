use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::ParkingApi;
use crate::clock::run_clock;
use crate::config::AppConfig;
use crate::poller::{DataPoller, PollTarget};
use crate::types::PageRoute;
use crate::view::{DashboardView, SharedView};
use crate::watchdog::{HttpStreamDisplay, RetryPolicy, StreamMachine, StreamWatchdog, WatchdogHandle};

/// One open dashboard page and the tasks that keep it current.
///
/// Built once when the page opens; `shutdown` tears every task down, as
/// navigating away from the page would.
pub struct PageController {
    route: PageRoute,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    watchdog: Option<WatchdogHandle>,
}

impl PageController {
    pub async fn open(route: PageRoute, config: &AppConfig, view: SharedView) -> Result<Self> {
        info!("📄 Opening page {:?}", route);
        *view.write().await = DashboardView::for_route(&route);

        config.validate()?;
        let base_url = config.base_url()?;
        let api = ParkingApi::new(base_url.clone(), config.request_timeout())
            .context("failed to build HTTP client")?;

        // Everything fallible happens before the first task is spawned
        let watchdog = match &route {
            PageRoute::Listing => None,
            PageRoute::Details { lot } => {
                let (events_tx, events_rx) = mpsc::channel(32);
                let display = HttpStreamDisplay::new(events_tx, config.request_timeout(), config.first_frame_timeout())
                    .context("failed to build stream client")?;
                let policy = RetryPolicy {
                    max_retries: config.max_retries,
                    backoff: config.retry_backoff(),
                };
                let machine = StreamMachine::new(base_url, lot.clone(), policy);
                Some(StreamWatchdog::new(machine, display, events_rx, view.clone(), config.health_check_interval()))
            }
        };

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(run_clock(
            view.clone(),
            Duration::from_millis(config.clock_interval_ms),
            cancel.child_token(),
        )));

        let (target, poll_interval) = match &route {
            PageRoute::Listing => (PollTarget::Listing, config.listing_poll_interval_ms),
            PageRoute::Details { lot } => (PollTarget::Details(lot.clone()), config.details_poll_interval_ms),
        };
        let poller = DataPoller::new(api, view.clone(), target, Duration::from_millis(poll_interval));
        tasks.push(tokio::spawn(poller.run(cancel.child_token())));

        let watchdog = watchdog.map(|(watchdog, handle)| {
            tasks.push(tokio::spawn(watchdog.run(cancel.child_token())));
            handle
        });

        Ok(Self { route, cancel, tasks, watchdog })
    }

    /// Handle for user actions on the video panel; `None` on the listing page
    pub fn watchdog(&self) -> Option<&WatchdogHandle> {
        self.watchdog.as_ref()
    }

    pub async fn shutdown(self) {
        info!("🛑 Closing page {:?}", self.route);
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Page task failed: {}", e);
            }
        }
    }
}
