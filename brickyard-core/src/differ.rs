//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in the manifest with the "current state"
//! fetched from the Provider, and generates a list of required Effects (Plan).

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
///
/// Only attributes the manifest declares are compared; attributes the
/// provider fills in on its own (e.g., a server-assigned ip) are not a change.
pub fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Resources present in `current_states` but no longer desired are deleted.
pub fn create_plan(desired: &[Resource], current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        match diff(resource, &current) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                plan.add(Effect::Update {
                    id,
                    from: Box::new(from),
                    to,
                    changed_attributes,
                });
            }
            Diff::NoChange(_) => {}
        }
    }

    let desired_ids: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphaned: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired_ids.contains(&s.id))
        .collect();
    orphaned.sort_by(|a, b| a.id.name.cmp(&b.id.name));

    for state in orphaned {
        if let Some(identifier) = &state.identifier {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("loadbalancer", "web");
        let current = State::not_found(ResourceId::new("loadbalancer", "web"));

        let result = diff(&desired, &current);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("loadbalancer", "web")
            .with_attribute("name", Value::String("web-lb".to_string()));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("web-lb".to_string()));
        // Server-assigned attribute not declared in the manifest
        attrs.insert("ip".to_string(), Value::String("10.0.0.5".to_string()));
        let current = State::existing(ResourceId::new("loadbalancer", "web"), attrs);

        let result = diff(&desired, &current);
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("loadbalancer", "web")
            .with_attribute("nic_id", Value::String("nic-2".to_string()));

        let mut attrs = HashMap::new();
        attrs.insert("nic_id".to_string(), Value::String("nic-1".to_string()));
        let current = State::existing(ResourceId::new("loadbalancer", "web"), attrs);

        match diff(&desired, &current) {
            Diff::Update {
                changed_attributes, ..
            } => {
                assert_eq!(changed_attributes, vec!["nic_id".to_string()]);
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn create_plan_from_resources() {
        let resources = vec![
            Resource::new("loadbalancer", "new-lb"),
            Resource::new("loadbalancer", "existing-lb").with_attribute("dhcp", Value::Bool(true)),
        ];

        let mut current_states = HashMap::new();
        let mut attrs = HashMap::new();
        attrs.insert("dhcp".to_string(), Value::Bool(false));
        current_states.insert(
            ResourceId::new("loadbalancer", "existing-lb"),
            State::existing(ResourceId::new("loadbalancer", "existing-lb"), attrs),
        );

        let plan = create_plan(&resources, &current_states);

        assert_eq!(plan.effects().len(), 2);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(plan.effects()[1], Effect::Update { .. }));
    }

    #[test]
    fn create_plan_deletes_orphaned_resources() {
        let mut current_states = HashMap::new();
        current_states.insert(
            ResourceId::new("loadbalancer", "old-lb"),
            State::existing(ResourceId::new("loadbalancer", "old-lb"), HashMap::new())
                .with_identifier("lb-old"),
        );

        let plan = create_plan(&[], &current_states);

        assert_eq!(plan.effects().len(), 1);
        match &plan.effects()[0] {
            Effect::Delete { id, identifier } => {
                assert_eq!(id.name, "old-lb");
                assert_eq!(identifier, "lb-old");
            }
            other => panic!("Expected Delete, got {:?}", other),
        }
    }
}
