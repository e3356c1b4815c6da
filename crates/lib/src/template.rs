//! The generated deployment template.

use serde_json::{Map, Value, json};

use crate::resources::ResourceNode;
use crate::variables::VariableMap;

pub const TEMPLATE_SCHEMA: &str = "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";
pub const CONTENT_VERSION: &str = "1.0.0.0";

/// Variables and resources of one cluster, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  pub variables: VariableMap,
  pub resources: Vec<ResourceNode>,
}

impl Template {
  /// Render the deployment document.
  ///
  /// Parameters are declared by the caller's parameter file, so the
  /// `parameters` section is left empty.
  pub fn to_arm_json(&self) -> Value {
    let variables: Map<String, Value> = self
      .variables
      .iter()
      .map(|(key, value)| (key.clone(), value.clone()))
      .collect();
    let resources: Vec<Value> = self.resources.iter().map(ResourceNode::to_json).collect();
    json!({
      "$schema": TEMPLATE_SCHEMA,
      "contentVersion": CONTENT_VERSION,
      "parameters": {},
      "resources": resources,
      "variables": variables,
    })
  }
}
