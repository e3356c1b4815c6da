//! Error types for template generation.
//!
//! Generation is all-or-nothing: any error aborts the whole call and no
//! partial variable map or resource list is returned.

use thiserror::Error;

use crate::expr::ReferenceError;
use crate::graph::GraphError;

/// Errors that can occur while generating a deployment template.
#[derive(Debug, Error)]
pub enum GenerateError {
  /// A self-hosted cluster was given no master profile.
  ///
  /// The upstream validator guarantees one exists, so reaching this is a bug
  /// in whatever produced the model rather than a user input problem.
  #[error("cluster has neither a master profile nor a hosted master profile")]
  MissingMasterProfile,

  /// The etcd arrays are only defined for 1, 3 or 5 members.
  #[error("unsupported master count {0}: self-hosted masters must number 1, 3 or 5")]
  UnsupportedMasterCount(u32),

  /// Agent pool names namespace their variables, so they must be unique.
  #[error("duplicate agent pool name: {0}")]
  DuplicatePoolName(String),

  /// Two sub-derivations produced different values for the same variable.
  #[error("variable '{0}' derived twice with conflicting values")]
  ConflictingVariable(String),

  /// An expression references a variable that was never derived.
  #[error("variable '{referrer}' references undefined variable '{missing}'")]
  DanglingReference { referrer: String, missing: String },

  /// An expression string could not be scanned.
  #[error("malformed expression: {0}")]
  Expression(#[from] ReferenceError),

  /// The custom cloud environment descriptor could not be serialized.
  #[error("failed to serialize custom cloud environment: {0}")]
  Environment(#[from] serde_json::Error),

  /// The resource dependency graph is invalid.
  #[error("resource graph error: {0}")]
  Graph(#[from] GraphError),
}
