//! ProfitBricks Provider implementation
//!
//! This module contains the main provider implementation: it converts between
//! the host's `Resource`/`State` values and typed load balancer records, and
//! runs them through the lifecycle adapter.

use brickyard_core::provider::{ProviderError, ProviderResult};
use brickyard_core::resource::{Resource, ResourceId, State};

use crate::client::ProfitBricksClient;
use crate::config::ProviderConfig;
use crate::loadbalancer::{
    LoadBalancerAdapter, LoadBalancerConfig, LoadBalancerError, LoadBalancerRecord,
};
use crate::resources::LOADBALANCER;
use crate::waiter::Waiter;

impl LoadBalancerError {
    /// Convert into the host error, keeping this error as the cause
    pub fn into_provider_error(self, id: &ResourceId, identifier: &str) -> ProviderError {
        let error = ProviderError::new(self.to_string()).for_resource(id.clone());
        let error = if identifier.is_empty() {
            error
        } else {
            error.with_identifier(identifier)
        };
        error.with_cause(self)
    }
}

/// ProfitBricks Cloud API Provider
pub struct ProfitBricksProvider {
    client: ProfitBricksClient,
    config: ProviderConfig,
}

impl ProfitBricksProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let client = ProfitBricksClient::new(&config)
            .map_err(|e| ProviderError::new("Failed to build HTTP client").with_cause(e))?;
        Ok(Self { client, config })
    }

    fn adapter(&self) -> LoadBalancerAdapter<'_> {
        let waiter = Waiter::new(&self.client, self.config.timeout, self.config.poll_interval);
        LoadBalancerAdapter::new(&self.client, waiter)
    }

    fn check_type(id: &ResourceId) -> ProviderResult<()> {
        if id.resource_type != LOADBALANCER {
            return Err(ProviderError::new(format!(
                "Unknown resource type: {}",
                id.resource_type
            ))
            .for_resource(id.clone()));
        }
        Ok(())
    }

    fn record_to_state(id: &ResourceId, record: &LoadBalancerRecord) -> State {
        if record.is_absent() {
            return State::not_found(id.clone());
        }
        State::existing(id.clone(), record.config.to_attributes()).with_identifier(&record.id)
    }

    /// Read a load balancer
    ///
    /// `identifier` may be a plain id (datacenter known from `prior`) or an
    /// import id of the form "<datacenterId>;<loadBalancerId>".
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        Self::check_type(id)?;

        let identifier = match identifier {
            Some(identifier) if !identifier.is_empty() => identifier,
            _ => return Ok(State::not_found(id.clone())),
        };

        let config = prior
            .map(|state| LoadBalancerConfig::from_known_attributes(&state.attributes))
            .unwrap_or_default();
        let mut record = LoadBalancerRecord::new(config).with_id(identifier);

        self.adapter()
            .read(&mut record)
            .await
            .map_err(|e| e.into_provider_error(id, identifier))?;

        Ok(Self::record_to_state(id, &record))
    }

    /// Create a load balancer
    ///
    /// If the load balancer was created but a later step failed, the error
    /// carries its identifier so the host can keep track of it.
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        Self::check_type(&resource.id)?;

        let config = LoadBalancerConfig::from_attributes(&resource.attributes)
            .map_err(|e| e.into_provider_error(&resource.id, ""))?;
        let mut record = LoadBalancerRecord::new(config);

        if let Err(e) = self.adapter().create(&mut record).await {
            return Err(e.into_provider_error(&resource.id, &record.id));
        }

        Ok(Self::record_to_state(&resource.id, &record))
    }

    /// Update a load balancer
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        Self::check_type(id)?;

        let prior = LoadBalancerConfig::from_known_attributes(&from.attributes);
        let config = LoadBalancerConfig::from_attributes(&to.attributes)
            .map_err(|e| e.into_provider_error(id, identifier))?;
        let mut record = LoadBalancerRecord::new(config).with_id(identifier);

        self.adapter()
            .update(&mut record, &prior)
            .await
            .map_err(|e| e.into_provider_error(id, identifier))?;

        Ok(Self::record_to_state(id, &record))
    }

    /// Delete a load balancer
    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        state: &State,
    ) -> ProviderResult<()> {
        Self::check_type(id)?;

        let config = LoadBalancerConfig::from_known_attributes(&state.attributes);
        let mut record = LoadBalancerRecord::new(config).with_id(identifier);

        self.adapter()
            .delete(&mut record)
            .await
            .map_err(|e| e.into_provider_error(id, identifier))
    }
}
