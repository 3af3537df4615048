//! HTTP implementation of [`GameApi`].
//!
//! Each operation is one JSON request wrapped in its own [`Poller`]. The
//! response status is mapped onto [`ApiError`] by small pure functions so
//! the mapping can be tested without a server.

use std::time::Duration;

use prospector_core::config::ApiConfig;
use prospector_core::{ApiError, GameApi};
use prospector_types::{
    Area, CoinId, DigRequest, ErrorBody, ExploreReport, License, PermitId, TreasureId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::error::RunnerError;
use crate::poller::Poller;

/// Server error code for coordinates outside the world.
const CODE_WRONG_COORDINATES: i32 = 1000;
/// Server error code for a depth beyond the maximum.
const CODE_WRONG_DEPTH: i32 = 1001;

#[derive(Debug)]
struct Endpoints {
    health_check: String,
    explore: String,
    dig: String,
    cash: String,
    licenses: String,
}

impl Endpoints {
    fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            health_check: format!("{base}/health-check"),
            explore: format!("{base}/explore"),
            dig: format!("{base}/dig"),
            cash: format!("{base}/cash"),
            licenses: format!("{base}/licenses"),
        }
    }
}

#[derive(Debug)]
struct Pollers {
    health_check: Poller,
    explore: Poller,
    dig: Poller,
    cash: Poller,
    issue_license: Poller,
    list_licenses: Poller,
}

/// Game server client over HTTP/JSON.
#[derive(Debug)]
pub struct HttpGameApi {
    client: reqwest::Client,
    urls: Endpoints,
    pollers: Pollers,
}

impl HttpGameApi {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Client`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(600))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RunnerError::Client(e.to_string()))?;
        Ok(Self {
            client,
            urls: Endpoints::new(&config.base_url),
            pollers: Pollers {
                health_check: Poller::from_config(&config.health_check),
                explore: Poller::from_config(&config.explore),
                dig: Poller::from_config(&config.dig),
                cash: Poller::from_config(&config.cash),
                issue_license: Poller::from_config(&config.issue_license),
                list_licenses: Poller::from_config(&config.list_licenses),
            },
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(u16, Vec<u8>), ApiError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read(response).await
    }

    async fn get(&self, url: &str) -> Result<(u16, Vec<u8>), ApiError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        read(response).await
    }

    async fn explore_once(&self, area: Area) -> Result<ExploreReport, ApiError> {
        let (status, body) = self.post(&self.urls.explore, &area).await?;
        explore_response(status, &body)
    }
}

async fn read(response: reqwest::Response) -> Result<(u16, Vec<u8>), ApiError> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(transport_error)?;
    Ok((status, body.to_vec()))
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(err.to_string())
    }
}

impl GameApi for HttpGameApi {
    async fn health_check(&self) -> Result<(), ApiError> {
        self.pollers
            .health_check
            .run(None, move || async move {
                let (status, _) = self.get(&self.urls.health_check).await?;
                health_response(status)
            })
            .await
    }

    async fn explore(&self, area: Area) -> Result<ExploreReport, ApiError> {
        self.pollers
            .explore
            .run(None, move || self.explore_once(area))
            .await
    }

    async fn explore_before(
        &self,
        area: Area,
        deadline: Instant,
    ) -> Result<ExploreReport, ApiError> {
        self.pollers
            .explore
            .run(Some(deadline), move || self.explore_once(area))
            .await
    }

    async fn dig(
        &self,
        x: i64,
        y: i64,
        depth: u32,
        permit: PermitId,
    ) -> Result<Vec<TreasureId>, ApiError> {
        let request = DigRequest {
            license_id: permit,
            pos_x: x,
            pos_y: y,
            depth,
        };
        self.pollers
            .dig
            .run(None, move || async move {
                let (status, body) = self.post(&self.urls.dig, &request).await?;
                dig_response(status, &body)
            })
            .await
    }

    async fn cash(&self, treasure: &TreasureId) -> Result<Vec<CoinId>, ApiError> {
        self.pollers
            .cash
            .run(None, move || async move {
                let (status, body) = self.post(&self.urls.cash, treasure).await?;
                cash_response(status, &body)
            })
            .await
    }

    async fn issue_license(&self, coins: &[CoinId]) -> Result<License, ApiError> {
        self.pollers
            .issue_license
            .run(None, move || async move {
                let (status, body) = self.post(&self.urls.licenses, coins).await?;
                issue_response(status, &body)
            })
            .await
    }

    async fn list_licenses(&self) -> Result<Vec<License>, ApiError> {
        self.pollers
            .list_licenses
            .run(None, move || async move {
                let (status, body) = self.get(&self.urls.licenses).await?;
                list_response(status, &body)
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Status mapping
// ---------------------------------------------------------------------------

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

const fn health_response(status: u16) -> Result<(), ApiError> {
    match status {
        200 => Ok(()),
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

fn explore_response(status: u16, body: &[u8]) -> Result<ExploreReport, ApiError> {
    match status {
        200 => decode(body),
        422 => Err(ApiError::WrongCoordinates),
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

fn dig_response(status: u16, body: &[u8]) -> Result<Vec<TreasureId>, ApiError> {
    match status {
        200 => decode(body),
        403 => Err(ApiError::NoSuchLicense),
        404 => Err(ApiError::TreasureNotFound),
        422 => match decode::<ErrorBody>(body)?.code {
            CODE_WRONG_COORDINATES => Err(ApiError::WrongCoordinates),
            CODE_WRONG_DEPTH => Err(ApiError::WrongDepth),
            _ => Err(ApiError::UnexpectedStatus { status }),
        },
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

fn cash_response(status: u16, body: &[u8]) -> Result<Vec<CoinId>, ApiError> {
    match status {
        200 => decode(body),
        409 => Err(ApiError::TreasureNotDug),
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

fn issue_response(status: u16, body: &[u8]) -> Result<License, ApiError> {
    match status {
        200 => decode(body),
        409 => Err(ApiError::NoMoreLicenses),
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

fn list_response(status: u16, body: &[u8]) -> Result<Vec<License>, ApiError> {
    match status {
        200 => decode(body),
        _ => Err(ApiError::UnexpectedStatus { status }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_base_url() {
        let urls = Endpoints::new("http://server:8000/");
        assert_eq!(urls.dig, "http://server:8000/dig");
        assert_eq!(urls.health_check, "http://server:8000/health-check");
        assert_eq!(urls.licenses, "http://server:8000/licenses");
    }

    #[test]
    fn dig_statuses() {
        assert_eq!(
            dig_response(200, br#"["a1","b2"]"#).unwrap(),
            vec![TreasureId::from("a1"), TreasureId::from("b2")]
        );
        assert_eq!(dig_response(403, b""), Err(ApiError::NoSuchLicense));
        assert_eq!(dig_response(404, b""), Err(ApiError::TreasureNotFound));
        assert_eq!(
            dig_response(422, br#"{"code":1000,"message":"wrong coordinates"}"#),
            Err(ApiError::WrongCoordinates)
        );
        assert_eq!(
            dig_response(422, br#"{"code":1001,"message":"wrong depth"}"#),
            Err(ApiError::WrongDepth)
        );
        assert_eq!(
            dig_response(422, br#"{"code":7}"#),
            Err(ApiError::UnexpectedStatus { status: 422 })
        );
        assert_eq!(dig_response(503, b""), Err(ApiError::UnexpectedStatus { status: 503 }));
    }

    #[test]
    fn undecodable_body_is_retryable() {
        let err = dig_response(200, b"not json").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn explore_statuses() {
        let report =
            explore_response(200, br#"{"area":{"posX":1,"posY":2,"sizeX":3,"sizeY":4},"amount":9}"#)
                .unwrap();
        assert_eq!(report.amount, 9);
        assert_eq!(report.area.size_y, 4);
        assert_eq!(explore_response(422, b""), Err(ApiError::WrongCoordinates));
    }

    #[test]
    fn cash_statuses() {
        assert_eq!(cash_response(200, b"[5,6]").unwrap(), vec![CoinId(5), CoinId(6)]);
        assert_eq!(cash_response(409, b""), Err(ApiError::TreasureNotDug));
    }

    #[test]
    fn license_statuses() {
        let license = issue_response(200, br#"{"id":3,"digAllowed":5,"digUsed":1}"#).unwrap();
        assert_eq!(license.id, PermitId(3));
        assert_eq!(license.digs_remaining(), 4);
        assert_eq!(issue_response(409, b""), Err(ApiError::NoMoreLicenses));

        let listed = list_response(200, br#"[{"id":1,"digAllowed":3,"digUsed":3}]"#).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(list_response(500, b""), Err(ApiError::UnexpectedStatus { status: 500 }));
    }

    #[test]
    fn health_statuses() {
        assert_eq!(health_response(200), Ok(()));
        assert!(health_response(502).unwrap_err().is_retryable());
    }

    #[test]
    fn request_bodies_match_server_schema() {
        let dig = serde_json::to_value(DigRequest {
            license_id: PermitId(8),
            pos_x: 1,
            pos_y: 2,
            depth: 3,
        })
        .unwrap();
        assert_eq!(
            dig,
            serde_json::json!({"licenseID": 8, "posX": 1, "posY": 2, "depth": 3})
        );
        assert_eq!(
            serde_json::to_string(&TreasureId::from("t1")).unwrap(),
            r#""t1""#
        );
        assert_eq!(serde_json::to_string(&[CoinId(1), CoinId(2)]).unwrap(), "[1,2]");
    }
}
