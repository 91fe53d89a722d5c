//! Load balancer lifecycle
//!
//! Maps a [`LoadBalancerRecord`] onto Cloud API calls. Every state-changing
//! call is status-checked and then waited on before the next one is issued.
//!
//! The bound NIC is not a load balancer property: it lives in the
//! `balancednics` sub-collection, so replacing it means deleting the old
//! association and creating a new one. There is no atomic swap.

use std::collections::HashMap;

use brickyard_core::resource::{Value, get_bool, get_string};
use thiserror::Error;

use crate::client::{ApiResponse, LoadBalancer, LoadBalancerProperties, ProfitBricksClient};
use crate::resources::loadbalancer_schema;
use crate::utils::split_composite_id;
use crate::waiter::{Waiter, WaiterError};

pub const CREATE_LOADBALANCER: &str = "create-loadbalancer";
pub const GET_LOADBALANCER: &str = "get-loadbalancer";
pub const UPDATE_LOADBALANCER: &str = "update-loadbalancer";
pub const DELETE_LOADBALANCER: &str = "delete-loadbalancer";
pub const ASSOCIATE_NIC: &str = "associate-nic";
pub const DELETE_BALANCED_NIC: &str = "delete-balanced-nic";

#[derive(Debug, Error)]
pub enum LoadBalancerError {
    #[error("Invalid load balancer configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid load balancer identifier '{0}': expected <datacenterId>;<loadBalancerId>")]
    InvalidIdentifier(String),

    /// The API answered with a status above 299
    #[error("Error occurred during {operation} (HTTP {status}): {body}")]
    RemoteApi {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Load balancer {id} not found in datacenter {datacenter_id}")]
    NotFound { datacenter_id: String, id: String },

    #[error("Malformed {operation} response: {message}")]
    MalformedResponse {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Waiter(#[from] WaiterError),

    #[error("Failed to reach the Cloud API: {0}")]
    Transport(#[from] reqwest::Error),

    /// Earlier steps changed the remote object before `step` failed
    #[error("Load balancer {identifier} left partially applied, {step} failed: {source}")]
    PartiallyApplied {
        step: &'static str,
        identifier: String,
        #[source]
        source: Box<LoadBalancerError>,
    },
}

impl LoadBalancerError {
    fn partially_applied(self, step: &'static str, identifier: &str) -> Self {
        Self::PartiallyApplied {
            step,
            identifier: identifier.to_string(),
            source: Box::new(self),
        }
    }
}

type Result<T> = std::result::Result<T, LoadBalancerError>;

fn check_status(operation: &'static str, response: &ApiResponse) -> Result<()> {
    if response.is_error() {
        return Err(LoadBalancerError::RemoteApi {
            operation,
            status: response.status.as_u16(),
            body: response.body_text(),
        });
    }
    Ok(())
}

fn parse_loadbalancer(operation: &'static str, response: &ApiResponse) -> Result<LoadBalancer> {
    response
        .json()
        .map_err(|e| LoadBalancerError::MalformedResponse {
            operation,
            message: e.to_string(),
        })
}

// =============================================================================
// Declarative record
// =============================================================================

/// Declared attributes of a load balancer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadBalancerConfig {
    pub name: String,
    /// Left to the server when `None`
    pub ip: Option<String>,
    pub dhcp: Option<bool>,
    pub datacenter_id: String,
    pub nic_id: String,
}

impl LoadBalancerConfig {
    /// Validate declared attributes against the resource schema
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self> {
        if let Err(errors) = loadbalancer_schema().validate(attributes) {
            let mut messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            messages.sort();
            return Err(LoadBalancerError::InvalidConfig(messages.join("; ")));
        }
        Ok(Self::from_known_attributes(attributes))
    }

    /// Take whatever is known from recorded state, without validation
    pub fn from_known_attributes(attributes: &HashMap<String, Value>) -> Self {
        Self {
            name: get_string(attributes, "name").unwrap_or_default().to_string(),
            ip: get_string(attributes, "ip").map(str::to_string),
            dhcp: get_bool(attributes, "dhcp"),
            datacenter_id: get_string(attributes, "datacenter_id")
                .unwrap_or_default()
                .to_string(),
            nic_id: get_string(attributes, "nic_id")
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn to_attributes(&self) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(ip) = &self.ip {
            attributes.insert("ip".to_string(), Value::String(ip.clone()));
        }
        if let Some(dhcp) = self.dhcp {
            attributes.insert("dhcp".to_string(), Value::Bool(dhcp));
        }
        if !self.datacenter_id.is_empty() {
            attributes.insert(
                "datacenter_id".to_string(),
                Value::String(self.datacenter_id.clone()),
            );
        }
        if !self.nic_id.is_empty() {
            attributes.insert("nic_id".to_string(), Value::String(self.nic_id.clone()));
        }
        attributes
    }

    fn require_non_empty(&self) -> Result<()> {
        for (name, value) in [
            ("name", &self.name),
            ("datacenter_id", &self.datacenter_id),
            ("nic_id", &self.nic_id),
        ] {
            if value.trim().is_empty() {
                return Err(LoadBalancerError::InvalidConfig(format!(
                    "'{}' must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// A load balancer as tracked by the host: declared attributes plus the
/// server-assigned id. An empty id means the load balancer does not exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadBalancerRecord {
    pub id: String,
    pub config: LoadBalancerConfig,
}

impl LoadBalancerRecord {
    pub fn new(config: LoadBalancerConfig) -> Self {
        Self {
            id: String::new(),
            config,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_absent(&self) -> bool {
        self.id.is_empty()
    }

    /// Resolve (datacenter id, load balancer id)
    ///
    /// Imported records may only know a composite "dc;lb" id.
    fn identity(&self) -> Result<(String, String)> {
        let mut datacenter_id = self.config.datacenter_id.clone();
        let mut id = self.id.clone();

        if let Some((dc, lb)) = split_composite_id(&self.id) {
            if datacenter_id.is_empty() {
                datacenter_id = dc.to_string();
            }
            id = lb.to_string();
        }

        if datacenter_id.is_empty() {
            return Err(LoadBalancerError::InvalidIdentifier(self.id.clone()));
        }
        Ok((datacenter_id, id))
    }
}

/// What an update has to send
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadBalancerChanges {
    /// Changed properties only
    pub properties: LoadBalancerProperties,
    /// (old, new) NIC when the bound NIC changes
    pub nic: Option<(String, String)>,
}

impl LoadBalancerChanges {
    pub fn between(prior: &LoadBalancerConfig, desired: &LoadBalancerConfig) -> Self {
        let mut properties = LoadBalancerProperties::default();
        if desired.name != prior.name {
            properties.name = Some(desired.name.clone());
        }
        if desired.ip.is_some() && desired.ip != prior.ip {
            properties.ip = desired.ip.clone();
        }
        if desired.dhcp.is_some() && desired.dhcp != prior.dhcp {
            properties.dhcp = desired.dhcp;
        }

        let nic = (desired.nic_id != prior.nic_id)
            .then(|| (prior.nic_id.clone(), desired.nic_id.clone()));

        Self { properties, nic }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.nic.is_none()
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Drives create/read/update/delete of a single load balancer
pub struct LoadBalancerAdapter<'a> {
    client: &'a ProfitBricksClient,
    waiter: Waiter<'a>,
}

impl<'a> LoadBalancerAdapter<'a> {
    pub fn new(client: &'a ProfitBricksClient, waiter: Waiter<'a>) -> Self {
        Self { client, waiter }
    }

    /// Status-check a state-changing call, then wait for its request
    async fn settle(&self, operation: &'static str, response: ApiResponse) -> Result<()> {
        check_status(operation, &response)?;
        self.waiter
            .wait_till_provisioned(response.location())
            .await?;
        Ok(())
    }

    async fn bind_nic(&self, datacenter_id: &str, id: &str, nic_id: &str) -> Result<()> {
        log::info!("Binding NIC {} to load balancer {}", nic_id, id);
        let response = self.client.associate_nic(datacenter_id, id, nic_id).await?;
        self.settle(ASSOCIATE_NIC, response).await
    }

    async fn unbind_nic(&self, datacenter_id: &str, id: &str, nic_id: &str) -> Result<()> {
        log::info!("Removing NIC {} from load balancer {}", nic_id, id);
        let response = self
            .client
            .delete_balanced_nic(datacenter_id, id, nic_id)
            .await?;
        if response.is_not_found() {
            log::info!("NIC {} was not bound to load balancer {}", nic_id, id);
            return Ok(());
        }
        self.settle(DELETE_BALANCED_NIC, response).await
    }

    /// Create the load balancer, bind its NIC, then refresh from the server
    ///
    /// Only `name` is sent on creation; `ip` and `dhcp` come back through the
    /// trailing read. Once the API has handed out an id it stays on the record,
    /// even if the creation request or binding the NIC fails afterwards.
    pub async fn create(&self, record: &mut LoadBalancerRecord) -> Result<()> {
        record.config.require_non_empty()?;
        let datacenter_id = record.config.datacenter_id.clone();

        log::info!(
            "Creating load balancer '{}' in datacenter {}",
            record.config.name,
            datacenter_id
        );
        let request = LoadBalancer {
            id: None,
            properties: LoadBalancerProperties {
                name: Some(record.config.name.clone()),
                ..Default::default()
            },
        };
        let response = self
            .client
            .create_loadbalancer(&datacenter_id, &request)
            .await?;
        check_status(CREATE_LOADBALANCER, &response)?;

        let id = parse_loadbalancer(CREATE_LOADBALANCER, &response)?
            .id
            .filter(|id| !id.is_empty())
            .ok_or(LoadBalancerError::MalformedResponse {
                operation: CREATE_LOADBALANCER,
                message: "no id in response".to_string(),
            })?;
        record.id = id;
        if let Err(e) = self.waiter.wait_till_provisioned(response.location()).await {
            return Err(
                LoadBalancerError::from(e).partially_applied(CREATE_LOADBALANCER, &record.id)
            );
        }

        if let Err(e) = self
            .bind_nic(&datacenter_id, &record.id, &record.config.nic_id)
            .await
        {
            return Err(e.partially_applied(ASSOCIATE_NIC, &record.id));
        }

        self.read(record).await
    }

    /// Refresh `name`, `ip` and `dhcp` from the server
    ///
    /// A load balancer that no longer exists clears the record id.
    pub async fn read(&self, record: &mut LoadBalancerRecord) -> Result<()> {
        if record.is_absent() {
            return Ok(());
        }

        let (datacenter_id, id) = record.identity()?;
        record.config.datacenter_id = datacenter_id.clone();
        record.id = id.clone();

        let response = self.client.get_loadbalancer(&datacenter_id, &id).await?;
        if response.is_not_found() {
            log::info!(
                "Load balancer {} is gone from datacenter {}",
                id,
                datacenter_id
            );
            record.id.clear();
            return Ok(());
        }
        check_status(GET_LOADBALANCER, &response)?;

        let loadbalancer = parse_loadbalancer(GET_LOADBALANCER, &response)?;
        record.config.name = loadbalancer.properties.name.unwrap_or_default();
        record.config.ip = loadbalancer.properties.ip;
        record.config.dhcp = loadbalancer.properties.dhcp;
        Ok(())
    }

    /// Apply the difference between `prior` and the record's config
    ///
    /// Changed properties go out in one PATCH. A changed NIC is removed and
    /// the new one bound; if binding fails the load balancer has no NIC and
    /// the error says so.
    pub async fn update(
        &self,
        record: &mut LoadBalancerRecord,
        prior: &LoadBalancerConfig,
    ) -> Result<()> {
        if record.is_absent() {
            return Err(LoadBalancerError::InvalidIdentifier(String::new()));
        }
        record.config.require_non_empty()?;
        if !prior.datacenter_id.is_empty() && prior.datacenter_id != record.config.datacenter_id {
            return Err(LoadBalancerError::InvalidConfig(
                "datacenter_id cannot change in place, delete and recreate the load balancer"
                    .to_string(),
            ));
        }

        let (datacenter_id, id) = record.identity()?;
        record.id = id.clone();
        let changes = LoadBalancerChanges::between(prior, &record.config);
        log::info!("Updating load balancer {}: {:?}", id, changes);

        let response = self
            .client
            .update_loadbalancer(&datacenter_id, &id, &changes.properties)
            .await?;
        if response.is_not_found() {
            return Err(LoadBalancerError::NotFound { datacenter_id, id });
        }
        self.settle(UPDATE_LOADBALANCER, response).await?;
        let mut applied = !changes.properties.is_empty();

        if let Some((old_nic, new_nic)) = &changes.nic {
            if !old_nic.is_empty() {
                self.unbind_nic(&datacenter_id, &id, old_nic)
                    .await
                    .map_err(|e| {
                        if applied {
                            e.partially_applied(DELETE_BALANCED_NIC, &id)
                        } else {
                            e
                        }
                    })?;
                applied = true;
            }

            self.bind_nic(&datacenter_id, &id, new_nic)
                .await
                .map_err(|e| {
                    if applied {
                        e.partially_applied(ASSOCIATE_NIC, &id)
                    } else {
                        e
                    }
                })?;
        }

        self.read(record).await
    }

    /// Delete the load balancer and clear the record id
    ///
    /// A load balancer that is already gone counts as deleted.
    pub async fn delete(&self, record: &mut LoadBalancerRecord) -> Result<()> {
        if record.is_absent() {
            return Ok(());
        }

        let (datacenter_id, id) = record.identity()?;
        log::info!(
            "Deleting load balancer {} from datacenter {}",
            id,
            datacenter_id
        );
        let response = self.client.delete_loadbalancer(&datacenter_id, &id).await?;
        if response.is_not_found() {
            log::info!("Load balancer {} was already deleted", id);
        } else {
            self.settle(DELETE_LOADBALANCER, response).await?;
        }

        record.id.clear();
        Ok(())
    }
}
