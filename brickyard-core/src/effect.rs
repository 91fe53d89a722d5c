//! Effect - A side effect expressed as a value
//!
//! Effects describe what should happen to a resource. Nothing is executed
//! until a Plan containing them is applied against a Provider.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Create(Resource),
    Update {
        id: ResourceId,
        from: Box<State>,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    Delete {
        id: ResourceId,
        identifier: String,
    },
}

impl Effect {
    /// Verb shown in progress output
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Create(_) => "Create",
            Effect::Update { .. } => "Update",
            Effect::Delete { .. } => "Delete",
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Delete { id, .. } => id,
        }
    }
}
