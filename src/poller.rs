use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::ParkingApi;
use crate::types::{LotDetails, LotId, ParkingSnapshot};
use crate::view::{Counter, SharedView};

const ANIMATION_DURATION: Duration = Duration::from_millis(300);
/// One step per millisecond at most; larger jumps move by more than 1
const MAX_STEPS: u32 = 300;

fn step_count(from: u32, to: u32) -> u32 {
    from.abs_diff(to).clamp(1, MAX_STEPS)
}

/// Interval between steps when counting from `from` to `to`
pub fn step_duration(from: u32, to: u32) -> Duration {
    ANIMATION_DURATION / step_count(from, to)
}

/// Values shown on the way from `from` to `to`, excluding `from`
pub fn animation_steps(from: u32, to: u32) -> Vec<u32> {
    let distance = from.abs_diff(to);
    if distance == 0 {
        return Vec::new();
    }
    let steps = step_count(from, to);
    (1..=steps)
        .map(|n| {
            let moved = (u64::from(distance) * u64::from(n) / u64::from(steps)) as u32;
            if from <= to {
                from + moved
            } else {
                from - moved
            }
        })
        .collect()
}

/// What the poller fetches
#[derive(Debug, Clone)]
pub enum PollTarget {
    Listing,
    Details(LotId),
}

/// Periodic fetch-and-render loop for occupancy numbers
pub struct DataPoller {
    api: ParkingApi,
    view: SharedView,
    target: PollTarget,
    interval: Duration,
    animations: [Option<JoinHandle<()>>; 3],
}

impl DataPoller {
    pub fn new(api: ParkingApi, view: SharedView, target: PollTarget, interval: Duration) -> Self {
        Self {
            api,
            view,
            target,
            interval,
            animations: [None, None, None],
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("📊 Polling {:?} every {:?}", self.target, self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }

        for animation in self.animations.iter_mut().filter_map(Option::take) {
            animation.abort();
        }
        info!("🛑 Data poller stopped");
    }

    async fn poll_once(&mut self) {
        match self.target.clone() {
            PollTarget::Listing => {
                let snapshot = self.api.parking_data_or_mock().await;
                self.render_listing(snapshot).await;
            }
            PollTarget::Details(lot) => {
                let details = self.api.parking_details_or_mock(&lot).await;
                self.render_details(details).await;
            }
        }
    }

    async fn render_listing(&self, snapshot: ParkingSnapshot) {
        let mut view = self.view.write().await;
        let Some(listing) = view.listing.as_mut() else {
            return;
        };
        if let Some(lot1) = snapshot.lot1 {
            listing.lot1 = lot1;
        }
        if let Some(lot2) = snapshot.lot2 {
            listing.lot2 = lot2;
        }
    }

    async fn render_details(&mut self, details: LotDetails) {
        let target = details.occupancy();
        let current = {
            let mut view = self.view.write().await;
            let Some(view) = view.details.as_mut() else {
                return;
            };
            view.history = details.history;
            view.counters
        };

        for (slot, counter) in Counter::ALL.into_iter().enumerate() {
            let from = counter.get(&current);
            let to = counter.get(&target);
            if from == to {
                continue;
            }
            if let Some(previous) = self.animations[slot].take() {
                previous.abort();
            }
            self.animations[slot] = Some(tokio::spawn(animate_counter(self.view.clone(), counter, from, to)));
        }
    }
}

/// Count a details counter towards `to` one step at a time
async fn animate_counter(view: SharedView, counter: Counter, from: u32, to: u32) {
    let step = step_duration(from, to);
    debug!("Animating {:?} {} -> {} ({:?} per step)", counter, from, to, step);

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + step, step);
    for value in animation_steps(from, to) {
        ticker.tick().await;
        let mut view = view.write().await;
        if let Some(details) = view.details.as_mut() {
            counter.set(&mut details.counters, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Occupancy, PageRoute};
    use crate::view::{self, DashboardView};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_animation_steps() {
        assert_eq!(animation_steps(10, 13), vec![11, 12, 13]);
        assert_eq!(animation_steps(13, 10), vec![12, 11, 10]);
        assert!(animation_steps(5, 5).is_empty());
    }

    #[test]
    fn test_step_duration_spreads_over_300ms() {
        assert_eq!(step_duration(0, 3), Duration::from_millis(100));
        assert_eq!(step_duration(30, 0), Duration::from_millis(10));
        assert_eq!(step_duration(7, 7), Duration::from_millis(300));
    }

    #[test]
    fn test_large_jump_is_capped() {
        assert_eq!(step_duration(0, 400_000_000), Duration::from_millis(1));
        assert_eq!(step_duration(400_000_000, 0), Duration::from_millis(1));

        let steps = animation_steps(0, 400_000_000);
        assert_eq!(steps.len(), 300);
        assert_eq!(steps[0], 1_333_333);
        assert_eq!(steps.last(), Some(&400_000_000));
        assert!(steps.windows(2).all(|w| w[0] < w[1]));

        let down = animation_steps(u32::MAX, 0);
        assert_eq!(down.len(), 300);
        assert_eq!(down.last(), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_jump_reaches_target() {
        let view = view::shared(DashboardView::for_route(&PageRoute::Details { lot: LotId::new("1") }));
        animate_counter(view.clone(), Counter::Occupied, 0, 400_000_000).await;

        let counters = view.read().await.details.as_ref().unwrap().counters;
        assert_eq!(counters.occupied, 400_000_000);
    }

    async fn api_for(server: &MockServer) -> ParkingApi {
        ParkingApi::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_details_counters_animate_to_mock_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lot = LotId::new("1");
        let view = view::shared(DashboardView::for_route(&PageRoute::Details { lot: lot.clone() }));
        let mut poller = DataPoller::new(
            api_for(&server).await,
            view.clone(),
            PollTarget::Details(lot),
            Duration::from_secs(3),
        );

        poller.poll_once().await;
        for animation in poller.animations.iter_mut().filter_map(Option::take) {
            animation.await.unwrap();
        }

        let counters = view.read().await.details.as_ref().unwrap().counters;
        assert_eq!(counters, Occupancy::new(25, 12, 13));
    }

    #[tokio::test]
    async fn test_listing_renders_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/parking-data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lot2": {"total": 12, "available": 2, "occupied": 10}
            })))
            .mount(&server)
            .await;

        let view = view::shared(DashboardView::for_route(&PageRoute::Listing));
        let mut poller = DataPoller::new(api_for(&server).await, view.clone(), PollTarget::Listing, Duration::from_secs(5));
        poller.poll_once().await;

        let view = view.read().await;
        let listing = view.listing.as_ref().unwrap();
        assert_eq!(listing.lot1, Occupancy::default());
        assert_eq!(listing.lot2, Occupancy::new(12, 2, 10));
    }

    #[tokio::test]
    async fn test_listing_mock_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let view = view::shared(DashboardView::for_route(&PageRoute::Listing));
        let mut poller = DataPoller::new(api_for(&server).await, view.clone(), PollTarget::Listing, Duration::from_secs(5));
        poller.poll_once().await;

        let view = view.read().await;
        let listing = view.listing.as_ref().unwrap();
        assert_eq!(listing.lot1, Occupancy::new(25, 12, 13));
        assert_eq!(listing.lot2, Occupancy::new(30, 8, 22));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_animation_replaces_running_one() {
        let view = view::shared(DashboardView::for_route(&PageRoute::Details { lot: LotId::new("2") }));
        // Never contacted: details are rendered directly
        let api = ParkingApi::new(Url::parse("http://127.0.0.1:9/").unwrap(), Duration::from_secs(2)).unwrap();
        let mut poller = DataPoller::new(
            api,
            view.clone(),
            PollTarget::Details(LotId::new("2")),
            Duration::from_secs(3),
        );

        poller.render_details(LotDetails { total: 100, ..Default::default() }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        poller.render_details(LotDetails { total: 5, ..Default::default() }).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let counters = view.read().await.details.as_ref().unwrap().counters;
        assert_eq!(counters.total, 5);
    }
}
