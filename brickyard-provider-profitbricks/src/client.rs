//! Cloud API client
//!
//! Thin wrapper over the ProfitBricks REST endpoints used by the load balancer
//! resource. Every call returns the raw [`ApiResponse`] envelope; deciding
//! what a status code means is left to the caller.

use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ProviderConfig;

// =============================================================================
// Wire types
// =============================================================================

/// Load balancer as returned by the Cloud API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: LoadBalancerProperties,
}

/// Mutable load balancer properties
///
/// Unset fields are omitted from the JSON, so a PATCH only carries what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
}

impl LoadBalancerProperties {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.ip.is_none() && self.dhcp.is_none()
    }
}

/// Body of `GET <Location>` for an asynchronous request
#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatus {
    pub metadata: RequestStatusMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatusMetadata {
    /// QUEUED, RUNNING, DONE or FAILED
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Response envelope
// =============================================================================

/// Status, headers and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Anything above 299 counts as a failed call
    pub fn is_error(&self) -> bool {
        self.status.as_u16() > 299
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// Location of the asynchronous request spawned by this call
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Upper bound for a single HTTP exchange
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Authenticated Cloud API client
///
/// Credentials are bound at construction, so clients for different accounts
/// can be used side by side.
#[derive(Debug, Clone)]
pub struct ProfitBricksClient {
    http: HttpClient,
    endpoint: String,
    username: String,
    password: String,
}

impl ProfitBricksClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .user_agent(concat!("brickyard/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT.min(config.timeout))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn loadbalancers_url(&self, datacenter_id: &str) -> String {
        format!("{}/datacenters/{}/loadbalancers", self.endpoint, datacenter_id)
    }

    fn loadbalancer_url(&self, datacenter_id: &str, loadbalancer_id: &str) -> String {
        format!(
            "{}/{}",
            self.loadbalancers_url(datacenter_id),
            loadbalancer_id
        )
    }

    fn balanced_nics_url(&self, datacenter_id: &str, loadbalancer_id: &str) -> String {
        format!(
            "{}/balancednics",
            self.loadbalancer_url(datacenter_id, loadbalancer_id)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        log::debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<ApiResponse, reqwest::Error> {
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        log::debug!("-> {}", status);

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    /// Create a load balancer in a datacenter
    pub async fn create_loadbalancer(
        &self,
        datacenter_id: &str,
        loadbalancer: &LoadBalancer,
    ) -> Result<ApiResponse, reqwest::Error> {
        let url = self.loadbalancers_url(datacenter_id);
        self.send(self.request(Method::POST, &url).json(loadbalancer))
            .await
    }

    pub async fn get_loadbalancer(
        &self,
        datacenter_id: &str,
        loadbalancer_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let url = self.loadbalancer_url(datacenter_id, loadbalancer_id);
        self.send(self.request(Method::GET, &url)).await
    }

    /// Patch load balancer properties; only the fields set in `properties` are sent
    pub async fn update_loadbalancer(
        &self,
        datacenter_id: &str,
        loadbalancer_id: &str,
        properties: &LoadBalancerProperties,
    ) -> Result<ApiResponse, reqwest::Error> {
        let url = self.loadbalancer_url(datacenter_id, loadbalancer_id);
        self.send(self.request(Method::PATCH, &url).json(properties))
            .await
    }

    pub async fn delete_loadbalancer(
        &self,
        datacenter_id: &str,
        loadbalancer_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let url = self.loadbalancer_url(datacenter_id, loadbalancer_id);
        self.send(self.request(Method::DELETE, &url)).await
    }

    /// Bind a NIC to a load balancer
    pub async fn associate_nic(
        &self,
        datacenter_id: &str,
        loadbalancer_id: &str,
        nic_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let url = self.balanced_nics_url(datacenter_id, loadbalancer_id);
        self.send(self.request(Method::POST, &url).json(&json!({ "id": nic_id })))
            .await
    }

    /// Remove a NIC from a load balancer
    pub async fn delete_balanced_nic(
        &self,
        datacenter_id: &str,
        loadbalancer_id: &str,
        nic_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let url = format!(
            "{}/{}",
            self.balanced_nics_url(datacenter_id, loadbalancer_id),
            nic_id
        );
        self.send(self.request(Method::DELETE, &url)).await
    }

    /// Fetch the status of an asynchronous request
    ///
    /// `location` is normally absolute; a bare path is resolved against the endpoint.
    pub async fn get_request_status(&self, location: &str) -> Result<ApiResponse, reqwest::Error> {
        let url = if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}/{}", self.endpoint, location.trim_start_matches('/'))
        };
        self.send(self.request(Method::GET, &url)).await
    }
}
