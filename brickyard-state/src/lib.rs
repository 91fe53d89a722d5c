//! Brickyard State Management
//!
//! Persists what Brickyard knows about managed resources between runs:
//! the provider identifier of each resource and its last observed attributes.
//!
//! - **StateFile**: all managed resources, with a serial and lineage
//! - **StateBackend**: storage trait, implemented by [`LocalBackend`]
//! - **LockInfo**: lock record guarding concurrent runs
//!
//! # Example
//!
//! ```ignore
//! use brickyard_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local())?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... apply changes, upsert resources ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile, json_to_value, value_to_json};
