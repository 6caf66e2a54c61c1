//! Graph error types.

use crate::quantity::NodeKey;
use rustqe_core::context::Axis;
use thiserror::Error;

/// Boxed error returned by provider functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while planning or executing a pipeline.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A required node has neither a parameter nor a provider.
    #[error("no provider or parameter for `{node}`{}", required_by(.path))]
    MissingProvider { node: NodeKey, path: Vec<NodeKey> },

    /// The dependency relation contains a cycle.
    #[error("cyclic dependency: {}", join_path(.cycle))]
    CyclicDependency { cycle: Vec<NodeKey> },

    /// A provider failed.
    #[error("failed to compute `{node}`: {source}")]
    Computation {
        node: NodeKey,
        #[source]
        source: BoxError,
    },

    /// An input must be reduced over an axis with no values.
    #[error("`{node}` needs values for the {axis} axis but its domain is empty")]
    EmptyDomain { node: NodeKey, axis: Axis },

    /// A request lacks a tag the quantity is parameterized by.
    #[error("`{quantity}` requested without a {axis} tag")]
    UnboundAxis { quantity: &'static str, axis: Axis },

    /// A provider read an input it did not declare.
    #[error("provider for `{quantity}` read undeclared input `{input}`")]
    UndeclaredInput {
        quantity: &'static str,
        input: &'static str,
    },

    /// A provider read a reduced input as a single value.
    #[error("input `{input}` of `{quantity}` is reduced over an axis; use `Inputs::all`")]
    ReducedInput {
        quantity: &'static str,
        input: &'static str,
    },

    /// A stored value does not have the quantity's type.
    #[error("value of `{node}` has an unexpected type")]
    TypeMismatch { node: NodeKey },
}

fn join_path(path: &[NodeKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn required_by(path: &[NodeKey]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" (required via {})", join_path(path))
    }
}
