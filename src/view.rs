use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{HistorySample, LotId, Occupancy, PageRoute};
use crate::watchdog::{Effect, StreamState, StreamStatus};

pub type SharedView = Arc<RwLock<DashboardView>>;

pub fn shared(view: DashboardView) -> SharedView {
    Arc::new(RwLock::new(view))
}

/// Everything the dashboard page currently renders
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    pub title: String,
    pub datetime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<ListingView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailsView>,
}

impl DashboardView {
    pub fn for_route(route: &PageRoute) -> Self {
        match route {
            PageRoute::Listing => Self {
                title: "Parking Lots".to_string(),
                listing: Some(ListingView::default()),
                ..Default::default()
            },
            PageRoute::Details { lot } => Self {
                title: format!("Parking Lot {} Details", lot),
                details: Some(DetailsView::new(lot.clone())),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub lot1: Occupancy,
    pub lot2: Occupancy,
    pub lot1_href: String,
    pub lot2_href: String,
}

impl Default for ListingView {
    fn default() -> Self {
        Self {
            lot1: Occupancy::default(),
            lot2: Occupancy::default(),
            lot1_href: PageRoute::details_href(&LotId::new("1")),
            lot2_href: PageRoute::details_href(&LotId::new("2")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailsView {
    pub lot: LotId,
    /// Counter values as currently displayed, possibly mid-animation
    pub counters: Occupancy,
    pub history: Vec<HistorySample>,
    pub back_href: String,
    pub stream: StreamView,
}

impl DetailsView {
    pub fn new(lot: LotId) -> Self {
        Self {
            stream: StreamView::new(&lot),
            lot,
            counters: Occupancy::default(),
            history: Vec::new(),
            back_href: PageRoute::back_href().to_string(),
        }
    }
}

/// Which occupancy counter a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Total,
    Available,
    Occupied,
}

impl Counter {
    pub const ALL: [Counter; 3] = [Counter::Total, Counter::Available, Counter::Occupied];

    pub fn get(self, occupancy: &Occupancy) -> u32 {
        match self {
            Counter::Total => occupancy.total,
            Counter::Available => occupancy.available,
            Counter::Occupied => occupancy.occupied,
        }
    }

    pub fn set(self, occupancy: &mut Occupancy, value: u32) {
        match self {
            Counter::Total => occupancy.total = value,
            Counter::Available => occupancy.available = value,
            Counter::Occupied => occupancy.occupied = value,
        }
    }
}

/// Video panel: the feed plus its loading and error overlays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamView {
    pub status: StreamStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub source: Option<String>,
    pub display_visible: bool,
    pub loading_visible: bool,
    pub error_visible: bool,
    pub error_message: String,
}

impl StreamView {
    pub fn new(lot: &LotId) -> Self {
        Self {
            status: StreamStatus::Loading,
            retry_count: 0,
            max_retries: 0,
            source: None,
            display_visible: true,
            loading_visible: false,
            error_visible: false,
            error_message: format!("Unable to load video stream for Parking Lot {}", lot),
        }
    }

    pub fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::AssignSource { url, .. } => self.source = Some(url.to_string()),
            Effect::ScheduleRetry { .. } => {}
            Effect::ShowLoading => self.loading_visible = true,
            Effect::HideLoading => self.loading_visible = false,
            Effect::ShowError => self.error_visible = true,
            Effect::HideError => self.error_visible = false,
            Effect::ShowDisplay => self.display_visible = true,
            Effect::HideDisplay => self.display_visible = false,
        }
    }

    pub fn sync(&mut self, state: &StreamState) {
        self.status = state.status;
        self.retry_count = state.retry_count;
        self.max_retries = state.max_retries;
    }
}
