//! Shared helpers for generation tests.

use std::path::PathBuf;

use serde_json::Value;

use kubearm_lib::resources::ResourceNode;
use kubearm_lib::scripts::BuiltinScripts;
use kubearm_lib::{ClusterModel, Template, generate};

/// Every fixture under `tests/fixtures`.
pub const FIXTURES: &[&str] = &[
  "single_master.json",
  "master_scale_set.json",
  "private_jumpbox.json",
  "three_masters.json",
  "five_masters_storage_account.json",
  "custom_cloud.json",
  "windows_image.json",
  "hosted.json",
  "custom_vnet.json",
  "custom_vnet_scale_set.json",
];

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Parse a fixture into a cluster model.
pub fn fixture_model(name: &str) -> ClusterModel {
  let content =
    std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e));
  ClusterModel::from_json(&content).unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", name, e))
}

/// Generate the template of a fixture with placeholder scripts.
pub fn generate_fixture(name: &str) -> Template {
  generate(&fixture_model(name), &BuiltinScripts).unwrap_or_else(|e| panic!("Failed to generate {}: {}", name, e))
}

/// Resources of the given template type, in emission order.
pub fn of_type<'a>(template: &'a Template, resource_type: &str) -> Vec<&'a ResourceNode> {
  template
    .resources
    .iter()
    .filter(|r| r.resource_type() == resource_type)
    .collect()
}

/// Position of the resource with this type and name.
pub fn position(template: &Template, resource_type: &str, name: &str) -> Option<usize> {
  template
    .resources
    .iter()
    .position(|r| r.resource_type() == resource_type && r.name == name)
}

pub fn has_resource(template: &Template, resource_type: &str, name: &str) -> bool {
  position(template, resource_type, name).is_some()
}

/// A variable that must be a string.
pub fn var_str<'a>(template: &'a Template, key: &str) -> &'a str {
  template
    .variables
    .get(key)
    .and_then(Value::as_str)
    .unwrap_or_else(|| panic!("variable {} missing or not a string", key))
}

pub const VM: &str = "Microsoft.Compute/virtualMachines";
pub const VMSS: &str = "Microsoft.Compute/virtualMachineScaleSets";
pub const EXTENSION: &str = "Microsoft.Compute/virtualMachines/extensions";
pub const AVSET: &str = "Microsoft.Compute/availabilitySets";
pub const IMAGE: &str = "Microsoft.Compute/images";
pub const NIC: &str = "Microsoft.Network/networkInterfaces";
pub const VNET: &str = "Microsoft.Network/virtualNetworks";
pub const NSG: &str = "Microsoft.Network/networkSecurityGroups";
pub const LB: &str = "Microsoft.Network/loadBalancers";
pub const PUBLIC_IP: &str = "Microsoft.Network/publicIPAddresses";
pub const ROUTE_TABLE: &str = "Microsoft.Network/routeTables";
pub const STORAGE: &str = "Microsoft.Storage/storageAccounts";
pub const KEY_VAULT: &str = "Microsoft.KeyVault/vaults";
pub const DEPLOYMENT: &str = "Microsoft.Resources/deployments";
pub const IDENTITY: &str = "Microsoft.ManagedIdentity/userAssignedIdentities";
