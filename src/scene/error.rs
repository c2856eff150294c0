use super::EntityId;

/// Errors that can occur during scene operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("entity {0} cannot be its own parent")]
    SelfParent(EntityId),
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle { parent: EntityId, child: EntityId },
    #[error("the scene root cannot be {0}")]
    RootOperation(&'static str),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}
