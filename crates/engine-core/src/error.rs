//! Error kinds: `InterfaceDescriptorError`, `MappingDescriptorError`,
//! `MappingError`, `ContainerBuildError`, `ContainerRunError`, `StoreError`,
//! and the umbrella `NodeError` that every `Node::run` converges on
//! (`StateError` is a specialization of `NodeError`, not a distinct
//! propagation path).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("interface descriptor error: {0}")]
pub struct InterfaceDescriptorError(pub String);

#[derive(Debug, Clone, Error)]
#[error("mapping descriptor error: {0}")]
pub struct MappingDescriptorError(pub String);

#[derive(Debug, Clone, Error)]
#[error("mapping error on {argument}: {message}")]
pub struct MappingError {
    pub argument: String,
    pub message: String,
}

impl MappingError {
    pub fn new(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("container build error: {0}")]
pub struct ContainerBuildError(pub String);

#[derive(Debug, Clone, Error)]
#[error("container run error: {0}")]
pub struct ContainerRunError(pub String);

#[derive(Debug, Clone, Error)]
#[error("document store error: {0}")]
pub struct StoreError(pub String);

/// A specialization of [`NodeError`]: an operation was invoked outside its legal
/// predecessor state. Reaching this in the happy path of a
/// correctly-driven `run()` is a programming error, not an operator mistake.
#[derive(Debug, Clone, Error)]
#[error("state error: {name} ({class}) in state {state}, cannot {operation}")]
pub struct StateError {
    pub name: String,
    pub class: &'static str,
    pub state: &'static str,
    pub operation: &'static str,
}

/// Generic node-level failure. Every `Node::run` converges on this type;
/// combinators decide whether to propagate or absorb it.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    InterfaceDescriptor(#[from] InterfaceDescriptorError),
    #[error(transparent)]
    MappingDescriptor(#[from] MappingDescriptorError),
    #[error(transparent)]
    ContainerBuild(#[from] ContainerBuildError),
    #[error(transparent)]
    ContainerRun(#[from] ContainerRunError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<NodeError>,
    },
    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Wrap an error with the name of the node/child that raised it, the way
    /// Sequence wraps a propagated child failure in its own context.
    pub fn wrap(context: impl Into<String>, source: NodeError) -> Self {
        NodeError::Wrapped {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
