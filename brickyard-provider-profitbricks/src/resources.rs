//! Resource type definitions for the ProfitBricks provider

use brickyard_core::provider::ResourceType;
use brickyard_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Resource type name of a load balancer in manifests and state
pub const LOADBALANCER: &str = "loadbalancer";

pub struct LoadBalancerType;

impl ResourceType for LoadBalancerType {
    fn name(&self) -> &'static str {
        LOADBALANCER
    }

    fn schema(&self) -> ResourceSchema {
        loadbalancer_schema()
    }
}

/// Schema of the `loadbalancer` resource
pub fn loadbalancer_schema() -> ResourceSchema {
    ResourceSchema::new(LOADBALANCER)
        .with_description("A load balancer distributing traffic to a bound NIC")
        .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
        .attribute(
            AttributeSchema::new("ip", types::ipv4_address())
                .with_description("IPv4 address; assigned by the server when omitted"),
        )
        .attribute(AttributeSchema::new("dhcp", AttributeType::Bool))
        .attribute(
            AttributeSchema::new("datacenter_id", types::non_empty_string())
                .required()
                .with_description("Datacenter that contains the load balancer"),
        )
        .attribute(
            AttributeSchema::new("nic_id", types::non_empty_string())
                .required()
                .with_description("NIC bound to the load balancer"),
        )
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(LoadBalancerType)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickyard_core::resource::Value;
    use std::collections::HashMap;

    #[test]
    fn test_schema_requires_identity_fields() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("web".to_string()));

        let errors = loadbalancer_schema().validate(&attrs).unwrap_err();
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(messages.iter().any(|m| m.contains("datacenter_id")));
        assert!(messages.iter().any(|m| m.contains("nic_id")));
    }

    #[test]
    fn test_schema_names_match_wire_properties() {
        let properties = crate::client::LoadBalancerProperties {
            name: Some("web".to_string()),
            ip: Some("10.0.0.1".to_string()),
            dhcp: Some(true),
        };
        let wire = serde_json::to_value(&properties).unwrap();
        let schema = loadbalancer_schema();
        for key in wire.as_object().unwrap().keys() {
            assert!(schema.attributes.contains_key(key), "{} missing from schema", key);
        }
    }

    #[test]
    fn test_resource_types() {
        let types = resource_types();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].name(), "loadbalancer");
        assert!(types[0].schema().attributes.contains_key("dhcp"));
    }
}
