//! HTTP client for the ride API.

use async_trait::async_trait;
use reqwest::{Client, Method};
use rideshare_shared::{
    ApiError, CancelRideRequest, GeoPoint, Ride, RideStatus, UpdateLocationRequest,
    UpdateStatusRequest, Vehicle, VehicleActiveRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// The ride endpoints the synchronization core depends on.
///
/// `fetch_active_ride` returns `Ok(None)` when the server reports that there is
/// no active ride; that is never an `Err`.
#[async_trait(?Send)]
pub trait RideApi {
    async fn fetch_active_ride(&self) -> Result<Option<Ride>, ApiError>;
    async fn accept_ride(&self, ride_id: &str) -> Result<Ride, ApiError>;
    async fn reject_ride(&self, ride_id: &str) -> Result<(), ApiError>;
    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> Result<Ride, ApiError>;
    async fn advance_status(&self, ride_id: &str, status: RideStatus) -> Result<Ride, ApiError>;
    async fn set_vehicle_active(&self, vehicle_id: &str, active: bool) -> Result<Vehicle, ApiError>;
    async fn update_driver_location(&self, location: GeoPoint) -> Result<(), ApiError>;
}

/// HTTP client for making authenticated API requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Send a request and return the raw body of a successful response.
    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.request(method.clone(), &url);

        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }
        if let Some(body) = body {
            rb = rb.header("Content-Type", "application/json").body(body);
        }

        crate::log_debug!("{} {}", method, url);
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        Ok(text)
    }

    fn decode<TRes: DeserializeOwned>(text: &str) -> Result<TRes, ApiError> {
        let text = if text.is_empty() { "null" } else { text };
        serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.send_raw(Method::GET, path, None).await?;
        Self::decode(&text)
    }

    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let text = self.send_raw(Method::POST, path, Some(bytes)).await?;
        Self::decode(&text)
    }

    pub async fn patch_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let text = self.send_raw(Method::PATCH, path, Some(bytes)).await?;
        Self::decode(&text)
    }

    fn ride_path(ride_id: &str, action: &str) -> String {
        format!("/api/rides/{}/{}", urlencoding::encode(ride_id), action)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Envelope used by the active-ride endpoint: `{ "ride": null }` means none.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ActiveRideBody {
    Bare(Option<Ride>),
    Wrapped { ride: Option<Ride> },
}

#[async_trait(?Send)]
impl RideApi for ApiClient {
    async fn fetch_active_ride(&self) -> Result<Option<Ride>, ApiError> {
        match self.get_json::<ActiveRideBody>("/api/rides/active").await {
            Ok(ActiveRideBody::Bare(ride)) | Ok(ActiveRideBody::Wrapped { ride }) => Ok(ride),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn accept_ride(&self, ride_id: &str) -> Result<Ride, ApiError> {
        self.post_json(&Self::ride_path(ride_id, "accept"), &serde_json::json!({}))
            .await
    }

    async fn reject_ride(&self, ride_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_json(&Self::ride_path(ride_id, "reject"), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> Result<Ride, ApiError> {
        let req = CancelRideRequest {
            reason: reason.to_string(),
        };
        self.post_json(&Self::ride_path(ride_id, "cancel"), &req).await
    }

    async fn advance_status(&self, ride_id: &str, status: RideStatus) -> Result<Ride, ApiError> {
        self.patch_json(&Self::ride_path(ride_id, "status"), &UpdateStatusRequest { status })
            .await
    }

    async fn set_vehicle_active(&self, vehicle_id: &str, active: bool) -> Result<Vehicle, ApiError> {
        let path = format!("/api/vehicles/{}/active", urlencoding::encode(vehicle_id));
        self.patch_json(&path, &VehicleActiveRequest { is_active: active })
            .await
    }

    async fn update_driver_location(&self, location: GeoPoint) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .patch_json("/api/drivers/me/location", &UpdateLocationRequest { location })
            .await?;
        Ok(())
    }
}
