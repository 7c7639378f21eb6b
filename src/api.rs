use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::types::{mock_details, mock_snapshot, LotDetails, LotId, ParkingSnapshot};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Client for the dashboard's occupancy endpoints
#[derive(Debug, Clone)]
pub struct ParkingApi {
    http: reqwest::Client,
    base_url: Url,
}

impl ParkingApi {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!("🌐 GET {}", url);
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// `GET /api/parking-data`
    pub async fn parking_data(&self) -> Result<ParkingSnapshot, ApiError> {
        let url = self.base_url.join("/api/parking-data")?;
        self.get_json(url).await
    }

    /// `GET /api/parking-details?lot=<id>`
    pub async fn parking_details(&self, lot: &LotId) -> Result<LotDetails, ApiError> {
        let mut url = self.base_url.join("/api/parking-details")?;
        url.query_pairs_mut().append_pair("lot", lot.as_str());
        self.get_json(url).await
    }

    /// Listing data, or the offline mock when the endpoint is unreachable
    pub async fn parking_data_or_mock(&self) -> ParkingSnapshot {
        match self.parking_data().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Error fetching parking data: {}", e);
                mock_snapshot()
            }
        }
    }

    /// Lot details, or the offline mock when the endpoint is unreachable
    pub async fn parking_details_or_mock(&self, lot: &LotId) -> LotDetails {
        match self.parking_details(lot).await {
            Ok(details) => details,
            Err(e) => {
                error!("Error fetching parking details for lot {}: {}", lot, e);
                mock_details(lot)
            }
        }
    }
}
