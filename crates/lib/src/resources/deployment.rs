//! Nested deployments.

use serde_json::json;

use super::{ResourceKind, ResourceNode};

const DEPLOYMENT_SCHEMA: &str = "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";

/// Empty nested deployment named by a partner ID, which lets Azure Stack
/// attribute the deployment.
pub fn telemetry_deployment(telemetry_pid: &str) -> ResourceNode {
  ResourceNode::new(ResourceKind::Deployment, telemetry_pid).properties(json!({
    "mode": "Incremental",
    "template": {
      "$schema": DEPLOYMENT_SCHEMA,
      "contentVersion": "1.0.0.0",
      "resources": [],
    },
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn telemetry_is_an_empty_incremental_deployment() {
    let deployment = telemetry_deployment("pid-1234").to_json();
    assert_eq!(deployment["name"], "pid-1234");
    assert_eq!(deployment["type"], "Microsoft.Resources/deployments");
    assert_eq!(deployment["apiVersion"], "[variables('apiVersionDeployments')]");
    assert_eq!(deployment["properties"]["mode"], "Incremental");
    assert_eq!(deployment["properties"]["template"]["resources"], json!([]));
    assert!(deployment.get("location").is_none());
  }
}
