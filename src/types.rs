use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Parking lot identifier as it appears in the `lot` query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(String);

impl LotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Occupancy counters for one lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Occupancy {
    pub total: u32,
    pub available: u32,
    pub occupied: u32,
}

impl Occupancy {
    pub const fn new(total: u32, available: u32, occupied: u32) -> Self {
        Self { total, available, occupied }
    }
}

/// Payload of `GET /api/parking-data`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParkingSnapshot {
    #[serde(default)]
    pub lot1: Option<Occupancy>,
    #[serde(default)]
    pub lot2: Option<Occupancy>,
}

/// One occupancy sample recorded by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySample {
    pub time: String,
    pub available: u32,
    pub occupied: u32,
}

/// Payload of `GET /api/parking-details?lot=<id>`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LotDetails {
    pub total: u32,
    pub available: u32,
    pub occupied: u32,
    #[serde(default)]
    pub history: Vec<HistorySample>,
}

impl LotDetails {
    pub fn occupancy(&self) -> Occupancy {
        Occupancy::new(self.total, self.available, self.occupied)
    }
}

const MOCK_LOT_ONE: Occupancy = Occupancy::new(25, 12, 13);
const MOCK_OTHER_LOT: Occupancy = Occupancy::new(30, 8, 22);

/// Offline stand-in for the details endpoint
pub fn mock_details(lot: &LotId) -> LotDetails {
    let occupancy = if lot.as_str() == "1" { MOCK_LOT_ONE } else { MOCK_OTHER_LOT };
    LotDetails {
        total: occupancy.total,
        available: occupancy.available,
        occupied: occupancy.occupied,
        history: Vec::new(),
    }
}

/// Offline stand-in for the listing endpoint
pub fn mock_snapshot() -> ParkingSnapshot {
    ParkingSnapshot {
        lot1: Some(MOCK_LOT_ONE),
        lot2: Some(MOCK_OTHER_LOT),
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("details page requires a `lot` query parameter")]
    MissingLot,
    #[error("unknown dashboard page: {0}")]
    UnknownPage(String),
}

/// Dashboard page selected by the page URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum PageRoute {
    Listing,
    Details { lot: LotId },
}

impl PageRoute {
    pub fn parse(url: &Url) -> Result<Self, RouteError> {
        let path = url.path();
        match path.rsplit('/').next().unwrap_or_default() {
            "" | "index.html" => Ok(PageRoute::Listing),
            "details.html" => url
                .query_pairs()
                .find(|(key, _)| key == "lot")
                .map(|(_, value)| PageRoute::Details { lot: LotId::new(value.into_owned()) })
                .ok_or(RouteError::MissingLot),
            _ => Err(RouteError::UnknownPage(path.to_string())),
        }
    }

    /// Link from the listing page to a lot's details page
    pub fn details_href(lot: &LotId) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("lot", lot.as_str())
            .finish();
        format!("details.html?{}", query)
    }

    /// Link from the details page back to the listing
    pub fn back_href() -> &'static str {
        "/"
    }
}
