//! Brickyard Core
//!
//! Core library for a declarative infrastructure tool: the resource model,
//! the `Provider` trait providers implement, attribute schemas and the differ
//! that turns desired vs. current state into a plan of effects.

pub mod differ;
pub mod effect;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
