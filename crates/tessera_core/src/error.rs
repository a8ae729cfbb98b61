//! # ECS Error Types
//!
//! Recoverable failures of the storage engine. Absence (a missing key, a dead
//! entity on lookup) is reported through `Option`/`bool`, not through this
//! type; contract violations panic.

use thiserror::Error;

use crate::ecs::Entity;

/// Errors that can occur in the ECS.
#[derive(Error, Debug)]
pub enum EcsError {
    /// A component type was used before `World::register` was called for it.
    #[error("component type not registered: {name}")]
    UnregisteredComponent {
        /// Type name of the component.
        name: &'static str,
    },

    /// The registry already holds the maximum number of component types.
    #[error("component limit reached: at most {limit} component types")]
    ComponentLimit {
        /// Maximum number of component types.
        limit: usize,
    },

    /// A bundle names the same component type twice.
    #[error("duplicate component in bundle: {name}")]
    DuplicateComponent {
        /// Type name of the component.
        name: &'static str,
    },

    /// The entity is not alive (never spawned, despawned, or stale generation).
    #[error("no such entity: {0:?}")]
    NoSuchEntity(Entity),

    /// The entity is alive but does not carry the component.
    #[error("entity {entity:?} has no {name} component")]
    MissingComponent {
        /// The entity that was accessed.
        entity: Entity,
        /// Type name of the component.
        name: &'static str,
    },

    /// Every entity id is in use.
    #[error("entity limit reached: at most {limit} live entities")]
    EntityLimit {
        /// Maximum number of live entities.
        limit: u32,
    },

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("configuration read error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
