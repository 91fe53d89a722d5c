//! Manifest loading
//!
//! A manifest is a JSON document:
//!
//! ```json
//! {
//!   "provider": { "username": "...", "password": "..." },
//!   "backend": { "type": "local", "path": "brickyard.state.json" },
//!   "loadbalancers": {
//!     "web": { "name": "web", "datacenter_id": "...", "nic_id": "..." }
//!   }
//! }
//! ```
//!
//! `provider` and `backend` are optional. The state file defaults to
//! `brickyard.state.json` next to the manifest.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use brickyard_core::resource::{Resource, Value};
use brickyard_provider_profitbricks::resources::LOADBALANCER;
use brickyard_state::{BackendConfig, LocalBackend, json_to_value};

pub const DEFAULT_MANIFEST: &str = "brickyard.json";

#[derive(Debug)]
pub struct Manifest {
    pub provider: HashMap<String, Value>,
    pub backend: BackendConfig,
    /// Declared resources, ordered by name
    pub resources: Vec<Resource>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::parse(&content, base_dir)
    }

    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, String> {
        let document: serde_json::Value =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;
        let root = document
            .as_object()
            .ok_or_else(|| "Parse error: manifest must be a JSON object".to_string())?;

        let provider = match root.get("provider") {
            Some(value) => object_attributes("provider", value)?,
            None => HashMap::new(),
        };

        let backend = match root.get("backend") {
            Some(value) => parse_backend(value)?,
            None => BackendConfig::local(),
        };
        let backend = anchor_state_path(backend, base_dir);

        let mut resources = Vec::new();
        if let Some(loadbalancers) = root.get("loadbalancers") {
            let entries = loadbalancers
                .as_object()
                .ok_or_else(|| "Parse error: 'loadbalancers' must be an object".to_string())?;
            for (name, attributes) in entries {
                let attributes = object_attributes(&format!("loadbalancers.{}", name), attributes)?;
                let mut resource = Resource::new(LOADBALANCER, name.clone());
                resource.attributes = attributes;
                resources.push(resource);
            }
        }
        resources.sort_by(|a, b| a.id.name.cmp(&b.id.name));

        Ok(Self {
            provider,
            backend,
            resources,
        })
    }
}

fn object_attributes(
    context: &str,
    value: &serde_json::Value,
) -> Result<HashMap<String, Value>, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("Parse error: '{}' must be an object", context))?;
    Ok(object
        .iter()
        .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
        .collect())
}

fn parse_backend(value: &serde_json::Value) -> Result<BackendConfig, String> {
    let mut attributes = object_attributes("backend", value)?;
    let backend_type = match attributes.remove("type") {
        Some(Value::String(s)) => s,
        Some(_) => return Err("Parse error: 'backend.type' must be a string".to_string()),
        None => "local".to_string(),
    };
    Ok(BackendConfig {
        backend_type,
        attributes,
    })
}

/// Relative state paths resolve against the manifest's directory
fn anchor_state_path(mut backend: BackendConfig, base_dir: &Path) -> BackendConfig {
    if backend.backend_type != "local" {
        return backend;
    }
    let path = backend
        .get_string("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(LocalBackend::DEFAULT_STATE_FILE));
    let path = if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    };
    backend.attributes.insert(
        "path".to_string(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    backend
}
