mod manifest;

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use brickyard_core::differ::create_plan;
use brickyard_core::effect::Effect;
use brickyard_core::plan::Plan;
use brickyard_core::provider::{Provider, ResourceType};
use brickyard_core::resource::{Resource, ResourceId, State, Value};
use brickyard_core::schema::ResourceSchema;
use brickyard_provider_profitbricks::resources::{LOADBALANCER, resource_types};
use brickyard_provider_profitbricks::{ProfitBricksProvider, ProviderConfig, split_composite_id};
use brickyard_state::{
    LockInfo, ResourceState, StateBackend, StateFile, create_backend, value_to_json,
};

use manifest::{DEFAULT_MANIFEST, Manifest};

#[derive(Parser)]
#[command(name = "brickyard")]
#[command(about = "Declarative ProfitBricks load balancer management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest
    Validate {
        /// Path to manifest file
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to manifest file
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to manifest file
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Re-read every tracked resource and update the state file
    Refresh {
        /// Path to manifest file
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Destroy every resource tracked in state
    Destroy {
        /// Path to manifest file
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing load balancer into state
    Import {
        /// Resource name in the manifest
        name: String,
        /// Import id: "<datacenterId>;<loadBalancerId>"
        id: String,
        /// Path to manifest file
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Refresh { file } => run_refresh(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import { name, id, file } => run_import(&name, &id, &file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    resource_types()
        .into_iter()
        .map(|t| (t.name().to_string(), t.schema()))
        .collect()
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let schemas = get_schemas();
    let mut all_errors = Vec::new();

    for resource in resources {
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    let mut messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                    messages.sort();
                    for message in messages {
                        all_errors.push(format!("{}: {}", resource.id, message));
                    }
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn get_provider(manifest: &Manifest) -> Result<Box<dyn Provider>, String> {
    let config = ProviderConfig::from_attributes(&manifest.provider)
        .map_err(|e| format!("Provider configuration error: {}", e))?;
    log::debug!("Using ProfitBricks endpoint {}", config.endpoint);
    let provider = ProfitBricksProvider::new(config).map_err(|e| e.to_string())?;
    Ok(Box::new(provider))
}

fn get_backend(manifest: &Manifest) -> Result<Box<dyn StateBackend>, String> {
    create_backend(&manifest.backend).map_err(|e| format!("State backend error: {}", e))
}

async fn read_state_file(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default())
}

async fn save_state_file(backend: &dyn StateBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

async fn acquire_lock(backend: &dyn StateBackend, operation: &str) -> Result<LockInfo, String> {
    backend
        .acquire_lock(operation)
        .await
        .map_err(|e| format!("Failed to acquire state lock: {}", e))
}

async fn release_lock(backend: &dyn StateBackend, lock: &LockInfo) {
    if let Err(e) = backend.release_lock(lock).await {
        eprintln!(
            "{} Failed to release state lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
}

/// Read every tracked resource from the provider, seeded with its recorded state
async fn refresh_states(
    provider: &dyn Provider,
    state_file: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current_states = HashMap::new();
    for (id, prior) in state_file.states() {
        let state = provider
            .read(&id, prior.identifier.as_deref(), Some(&prior))
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if !state.exists {
            log::info!("{} no longer exists remotely", id);
        }
        current_states.insert(id, state);
    }
    Ok(current_states)
}

fn run_validate(file: &PathBuf) -> Result<(), String> {
    let manifest = Manifest::load(file)?;

    println!("{}", "Validating...".cyan());

    validate_resources(&manifest.resources)?;
    ProviderConfig::from_attributes(&manifest.provider)
        .map_err(|e| format!("Provider configuration error: {}", e))?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            manifest.resources.len()
        )
        .green()
        .bold()
    );

    for resource in &manifest.resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

async fn run_plan(file: &PathBuf) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    validate_resources(&manifest.resources)?;

    let provider = get_provider(&manifest)?;
    let backend = get_backend(&manifest)?;
    let state_file = read_state_file(backend.as_ref()).await?;

    let current_states = refresh_states(provider.as_ref(), &state_file).await?;
    let plan = create_plan(&manifest.resources, &current_states);
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &PathBuf) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    validate_resources(&manifest.resources)?;

    let provider = get_provider(&manifest)?;
    let backend = get_backend(&manifest)?;

    let lock = acquire_lock(backend.as_ref(), "apply").await?;
    let result = apply_locked(&manifest, provider.as_ref(), backend.as_ref()).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn apply_locked(
    manifest: &Manifest,
    provider: &dyn Provider,
    backend: &dyn StateBackend,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;
    let current_states = refresh_states(provider, &state_file).await?;

    // Resources deleted out of band are no longer tracked
    for (id, state) in &current_states {
        if !state.exists {
            state_file.remove_resource(&id.resource_type, &id.name);
        }
    }

    let plan = create_plan(&manifest.resources, &current_states);

    if plan.is_empty() {
        save_state_file(backend, &mut state_file).await?;
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    for effect in plan.effects() {
        let outcome = apply_effect(provider, effect, &mut state_file).await;
        match outcome {
            Ok(()) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                success_count += 1;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                failure_count += 1;
            }
        }
    }

    save_state_file(backend, &mut state_file).await?;

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

/// Execute one Effect and record its outcome in the state file
async fn apply_effect(
    provider: &dyn Provider,
    effect: &Effect,
    state_file: &mut StateFile,
) -> Result<(), String> {
    match effect {
        Effect::Create(resource) => match provider.create(resource).await {
            Ok(state) => {
                state_file.upsert_resource(ResourceState::from_state(&state, provider.name()));
                Ok(())
            }
            Err(e) => {
                // Created remotely but not fully configured: keep tracking it
                if let Some(identifier) = &e.identifier {
                    let mut recorded =
                        ResourceState::new(&resource.id.resource_type, &resource.id.name, provider.name())
                            .with_identifier(identifier);
                    for (key, value) in &resource.attributes {
                        if key != "nic_id" {
                            recorded.attributes.insert(key.clone(), value_to_json(value));
                        }
                    }
                    state_file.upsert_resource(recorded);
                }
                Err(e.to_string())
            }
        },
        Effect::Update { id, from, to, .. } => {
            let identifier = from
                .identifier
                .as_deref()
                .ok_or_else(|| format!("{} has no recorded identifier", id))?;
            let state = provider
                .update(id, identifier, from, to)
                .await
                .map_err(|e| e.to_string())?;
            state_file.upsert_resource(ResourceState::from_state(&state, provider.name()));
            Ok(())
        }
        Effect::Delete { id, identifier } => {
            let prior = state_file
                .find_resource(&id.resource_type, &id.name)
                .map(|r| r.to_state())
                .unwrap_or_else(|| State::not_found(id.clone()));
            provider
                .delete(id, identifier, &prior)
                .await
                .map_err(|e| e.to_string())?;
            state_file.remove_resource(&id.resource_type, &id.name);
            Ok(())
        }
    }
}

async fn run_refresh(file: &PathBuf) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;
    let backend = get_backend(&manifest)?;

    let lock = acquire_lock(backend.as_ref(), "refresh").await?;
    let result = refresh_locked(provider.as_ref(), backend.as_ref()).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn refresh_locked(provider: &dyn Provider, backend: &dyn StateBackend) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;

    if state_file.resources.is_empty() {
        println!("{}", "No resources tracked in state.".yellow());
        return Ok(());
    }

    println!("{}", "Refreshing state...".cyan());

    let current_states = refresh_states(provider, &state_file).await?;
    let mut ids: Vec<&ResourceId> = current_states.keys().collect();
    ids.sort_by(|a, b| a.name.cmp(&b.name));

    for id in ids {
        let state = &current_states[id];
        if state.exists {
            state_file.upsert_resource(ResourceState::from_state(state, provider.name()));
            println!("  {} {}", "✓".green(), id);
        } else {
            state_file.remove_resource(&id.resource_type, &id.name);
            println!("  {} {} {}", "-".red().bold(), id, "(gone, removed from state)".red());
        }
    }

    save_state_file(backend, &mut state_file).await?;
    println!("{}", "Refresh complete!".green().bold());
    Ok(())
}

async fn run_destroy(file: &PathBuf, auto_approve: bool) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;
    let backend = get_backend(&manifest)?;

    let lock = acquire_lock(backend.as_ref(), "destroy").await?;
    let result = destroy_locked(provider.as_ref(), backend.as_ref(), auto_approve).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn destroy_locked(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;

    let mut resources_to_destroy: Vec<(State, String)> = state_file
        .resources
        .iter()
        .filter_map(|r| {
            let identifier = r.identifier.clone()?;
            Some((r.to_state(), identifier))
        })
        .collect();
    resources_to_destroy.sort_by(|a, b| a.0.id.name.cmp(&b.0.id.name));

    if resources_to_destroy.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();

    for (state, identifier) in &resources_to_destroy {
        println!(
            "  {} {} {}",
            "-".red().bold(),
            state.id,
            format!("({})", identifier).dimmed()
        );
    }

    println!();
    println!(
        "Plan: {} to destroy.",
        resources_to_destroy.len().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    for (state, identifier) in resources_to_destroy {
        let effect = Effect::Delete {
            id: state.id.clone(),
            identifier: identifier.clone(),
        };
        match provider.delete(&state.id, &identifier, &state).await {
            Ok(()) => {
                state_file.remove_resource(&state.id.resource_type, &state.id.name);
                println!("  {} {}", "✓".green(), format_effect(&effect));
                success_count += 1;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(&effect), e);
                failure_count += 1;
            }
        }
    }

    save_state_file(backend, &mut state_file).await?;

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

async fn run_import(name: &str, import_id: &str, file: &PathBuf) -> Result<(), String> {
    let manifest = Manifest::load(file)?;

    let id = ResourceId::new(LOADBALANCER, name);
    if !manifest.resources.iter().any(|r| r.id == id) {
        return Err(format!("{} is not declared in {}", id, file.display()));
    }
    if split_composite_id(import_id).is_none() {
        return Err(format!(
            "Invalid import id '{}': expected \"<datacenterId>;<loadBalancerId>\"",
            import_id
        ));
    }

    let provider = get_provider(&manifest)?;
    let backend = get_backend(&manifest)?;

    let lock = acquire_lock(backend.as_ref(), "import").await?;
    let result = import_locked(provider.as_ref(), backend.as_ref(), &id, import_id).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn import_locked(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    id: &ResourceId,
    import_id: &str,
) -> Result<(), String> {
    let mut state_file = read_state_file(backend).await?;

    if let Some(existing) = state_file.find_resource(&id.resource_type, &id.name) {
        return Err(format!(
            "{} is already tracked (identifier: {})",
            id,
            existing.identifier.as_deref().unwrap_or("none")
        ));
    }

    println!("{}", format!("Importing {}...", id).cyan());

    let state = provider
        .read(id, Some(import_id), None)
        .await
        .map_err(|e| format!("Import failed: {}", e))?;
    if !state.exists {
        return Err(format!("Load balancer '{}' not found", import_id));
    }

    state_file.upsert_resource(ResourceState::from_state(&state, provider.name()));
    save_state_file(backend, &mut state_file).await?;

    println!(
        "{}",
        format!(
            "✓ Imported {} ({}).",
            id,
            state.identifier.as_deref().unwrap_or(import_id)
        )
        .green()
        .bold()
    );
    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let attr_prefix = "      ";

    for effect in plan.effects() {
        match effect {
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                for key in sorted_keys(&r.attributes) {
                    let value = format_value(&r.attributes[key]);
                    if key == "name" {
                        println!("{}{}: {}", attr_prefix, key.bold(), value.white().bold());
                    } else {
                        println!("{}{}: {}", attr_prefix, key, value.green());
                    }
                }
            }
            Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                println!("  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                for key in changed_attributes {
                    let Some(new_value) = to.attributes.get(key) else {
                        continue;
                    };
                    let old_str = from
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    println!(
                        "{}{}: {} → {}",
                        attr_prefix,
                        key,
                        old_str.red(),
                        format_value(new_value).green()
                    );
                }
            }
            Effect::Delete { id, identifier } => {
                println!("  {} {}", "-".red().bold(), id.to_string().cyan().bold());
                println!("{}{}: {}", attr_prefix, "id".bold(), identifier.red().bold());
            }
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to destroy.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.delete.to_string().red()
    );
}

/// Attribute keys with "name" first, internal keys hidden
fn sorted_keys(attributes: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<_> = attributes
        .keys()
        .filter(|k| !k.starts_with('_'))
        .collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

fn format_effect(effect: &Effect) -> String {
    format!("{} {}", effect.kind(), effect.resource_id())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}
