//! Brickyard ProfitBricks Provider
//!
//! ProfitBricks Cloud API (v3) Provider implementation.
//!
//! ## Module Structure
//!
//! - `client` - REST client and wire types
//! - `config` - Credentials, endpoint and wait settings
//! - `loadbalancer` - Load balancer lifecycle (create/read/update/delete)
//! - `provider` - ProfitBricksProvider implementation
//! - `resources` - Resource type definitions and schemas
//! - `utils` - Composite identifier helpers
//! - `waiter` - Polling of asynchronous provisioning requests

pub mod client;
pub mod config;
pub mod loadbalancer;
pub mod provider;
pub mod resources;
pub mod utils;
pub mod waiter;

// Re-export main types
pub use config::{ConfigError, ProviderConfig};
pub use loadbalancer::{LoadBalancerConfig, LoadBalancerError, LoadBalancerRecord};
pub use provider::ProfitBricksProvider;
pub use utils::split_composite_id;

use brickyard_core::provider::{BoxFuture, Provider, ProviderResult};
use brickyard_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for ProfitBricksProvider {
    fn name(&self) -> &'static str {
        "profitbricks"
    }

    fn resource_types(&self) -> Vec<Box<dyn brickyard_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        prior: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        let prior = prior.cloned();
        Box::pin(async move {
            self.read_resource(&id, identifier.as_deref(), prior.as_ref())
                .await
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        state: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let state = state.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &state).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickyard_core::resource::Value;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> Box<dyn Provider> {
        let config = ProviderConfig::new("admin", "secret")
            .with_endpoint(server.uri())
            .with_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(5));
        Box::new(ProfitBricksProvider::new(config).unwrap())
    }

    fn web_resource() -> Resource {
        Resource::new("loadbalancer", "web")
            .with_attribute("name", Value::String("web".to_string()))
            .with_attribute("datacenter_id", Value::String("dc-1".to_string()))
            .with_attribute("nic_id", Value::String("nic-1".to_string()))
    }

    async fn mount_requests_done(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/requests/[^/]+/status$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"metadata": {"status": "DONE"}})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_returns_state_with_identifier() {
        let server = MockServer::start().await;
        mount_requests_done(&server).await;
        let location = format!("{}/requests/r-1/status", server.uri());

        Mock::given(method("POST"))
            .and(path("/datacenters/dc-1/loadbalancers"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", location.clone())
                    .set_body_json(json!({"id": "lb-1", "properties": {"name": "web"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/datacenters/dc-1/loadbalancers/lb-1/balancednics"))
            .respond_with(ResponseTemplate::new(202).insert_header("Location", location))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/datacenters/dc-1/loadbalancers/lb-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "lb-1", "properties": {"name": "web", "ip": "10.0.0.5", "dhcp": true}}),
            ))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let state = provider.create(&web_resource()).await.unwrap();

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("lb-1"));
        assert_eq!(state.get_string("name"), Some("web"));
        assert_eq!(state.get_string("ip"), Some("10.0.0.5"));
        assert_eq!(state.get_string("nic_id"), Some("nic-1"));
        assert_eq!(state.get_string("datacenter_id"), Some("dc-1"));
    }

    #[tokio::test]
    async fn test_create_error_carries_identifier() {
        let server = MockServer::start().await;
        mount_requests_done(&server).await;

        Mock::given(method("POST"))
            .and(path("/datacenters/dc-1/loadbalancers"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", format!("{}/requests/r-1/status", server.uri()))
                    .set_body_json(json!({"id": "lb-1", "properties": {"name": "web"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/datacenters/dc-1/loadbalancers/lb-1/balancednics"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.create(&web_resource()).await.unwrap_err();

        assert_eq!(err.identifier.as_deref(), Some("lb-1"));
        assert_eq!(err.resource_id, Some(ResourceId::new("loadbalancer", "web")));
        assert!(err.message.contains("associate-nic"));
    }

    #[tokio::test]
    async fn test_failed_create_job_still_reports_identifier() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/datacenters/dc-1/loadbalancers"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", format!("{}/requests/r-1/status", server.uri()))
                    .set_body_json(json!({"id": "lb-1", "properties": {"name": "web"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/r-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"metadata": {"status": "FAILED", "message": "quota exceeded"}}),
            ))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.create(&web_resource()).await.unwrap_err();

        assert_eq!(err.identifier.as_deref(), Some("lb-1"));
        assert!(err.message.contains("create-loadbalancer"));
        assert!(err.message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_create_validates_before_calling_api() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);

        let resource = Resource::new("loadbalancer", "web")
            .with_attribute("name", Value::String("web".to_string()));
        let err = provider.create(&resource).await.unwrap_err();

        assert!(err.message.contains("datacenter_id"));
        assert!(err.identifier.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_without_identifier_is_not_found() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);

        let state = provider
            .read(&ResourceId::new("loadbalancer", "web"), None, None)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn test_read_keeps_prior_nic() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/datacenters/dc-1/loadbalancers/lb-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"id": "lb-1", "properties": {"name": "renamed-out-of-band"}}),
            ))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let id = ResourceId::new("loadbalancer", "web");
        let prior = State::existing(id.clone(), web_resource().attributes).with_identifier("lb-1");

        let state = provider.read(&id, Some("lb-1"), Some(&prior)).await.unwrap();
        assert_eq!(state.get_string("name"), Some("renamed-out-of-band"));
        assert_eq!(state.get_string("nic_id"), Some("nic-1"));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let server = MockServer::start().await;
        let provider = provider_for(&server);

        let resource = Resource::new("server", "web");
        let err = provider.create(&resource).await.unwrap_err();
        assert!(err.message.contains("Unknown resource type"));
    }
}
