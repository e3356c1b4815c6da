//! Template variable derivation.
//!
//! The variable map is the flat namespace every resource expression reads
//! from. It is derived in named groups, each a pure function of the
//! [`Context`] returning its own [`VariableMap`]. Groups are merged into one
//! map; a key produced twice must carry the same value both times.
//!
//! After merging, every `variables('X')` reference inside an expression
//! value must name a key of the same map. A dangling reference fails the
//! whole derivation.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::model::ClusterModel;
//! use kubearm_lib::scripts::BuiltinScripts;
//! use kubearm_lib::variables::derive_variables;
//!
//! let model = ClusterModel::from_json(r#"{
//!   "clusterId": "12345678",
//!   "orchestrator": { "version": "1.18.8" },
//!   "master": { "count": 1, "dnsPrefix": "mycluster" },
//!   "agentPools": [{ "name": "agentpool1", "vmSize": "Standard_D2_v3" }]
//! }"#).unwrap();
//!
//! let vars = derive_variables(&model, &BuiltinScripts).unwrap();
//! assert_eq!(vars.get("masterFqdnPrefix").unwrap(), "mycluster");
//! assert!(vars.dangling_references().unwrap().is_empty());
//! ```

mod common;
mod master;
mod network;
mod pools;
mod provision;
mod storage;

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::GenerateError;
use crate::expr::{ReferenceError, value_variable_references};
use crate::model::ClusterModel;
use crate::scripts::ScriptProvider;

pub(crate) use network::{ClusterMetadata, numbered};

/// Ordered variable name to value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariableMap(BTreeMap<String, Value>);

impl VariableMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  /// The value of `key` when it is a string.
  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.0.get(key).and_then(Value::as_str)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
    self.0.iter()
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  /// Set a variable, replacing any previous value.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(key.into(), value.into());
  }

  /// Fold another group into this map.
  ///
  /// # Errors
  ///
  /// Returns `ConflictingVariable` if a key is present in both with
  /// different values.
  pub fn merge(&mut self, other: VariableMap) -> Result<(), GenerateError> {
    for (key, value) in other.0 {
      match self.0.get(&key) {
        Some(existing) if *existing != value => return Err(GenerateError::ConflictingVariable(key)),
        Some(_) => {}
        None => {
          self.0.insert(key, value);
        }
      }
    }
    Ok(())
  }

  /// Every `(referrer, missing)` pair where an expression names an absent key.
  pub fn dangling_references(&self) -> Result<Vec<(String, String)>, ReferenceError> {
    let mut dangling = Vec::new();
    for (key, value) in &self.0 {
      for name in value_variable_references(value)? {
        if !self.0.contains_key(&name) {
          dangling.push((key.clone(), name));
        }
      }
    }
    Ok(dangling)
  }

  /// Fail on the first dangling reference.
  pub fn check_references(&self) -> Result<(), GenerateError> {
    match self.dangling_references()?.into_iter().next() {
      Some((referrer, missing)) => Err(GenerateError::DanglingReference { referrer, missing }),
      None => Ok(()),
    }
  }

  pub fn into_inner(self) -> BTreeMap<String, Value> {
    self.0
  }
}

impl<'a> IntoIterator for &'a VariableMap {
  type Item = (&'a String, &'a Value);
  type IntoIter = btree_map::Iter<'a, String, Value>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

/// Derive the complete variable map for a cluster.
///
/// # Errors
///
/// Fails when the model is rejected by [`Context::new`], when two groups
/// disagree on a variable, or when the merged map has a dangling reference.
pub fn derive_variables(model: &ClusterModel, scripts: &dyn ScriptProvider) -> Result<VariableMap, GenerateError> {
  let ctx = Context::new(model, scripts)?;
  derive(&ctx)
}

pub(crate) fn derive(ctx: &Context<'_>) -> Result<VariableMap, GenerateError> {
  let metadata = ClusterMetadata::new(ctx);

  let groups: [(&str, VariableMap); 7] = [
    ("common", common::derive(ctx)?),
    ("network", network::derive(ctx, &metadata)),
    ("master", master::derive(ctx)?),
    ("storage", storage::derive(ctx)),
    ("pools", pools::derive(ctx)),
    ("windows", common::derive_windows(ctx)),
    ("provision", provision::derive(ctx, &metadata)?),
  ];

  let mut vars = VariableMap::new();
  for (group, part) in groups {
    debug!(group, count = part.len(), "derived variable group");
    vars.merge(part)?;
  }

  vars.check_references()?;
  Ok(vars)
}
