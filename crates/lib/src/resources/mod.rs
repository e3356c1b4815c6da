//! Resource nodes and their builders.
//!
//! A [`ResourceNode`] is one entry of the template's `resources` array. The
//! common envelope (API version, name, location, dependencies, copy loop)
//! is typed; everything kind-specific lives in a JSON field map, since the
//! deployment engine is the only consumer of those shapes.
//!
//! Builders are plain functions grouped by resource family. Each takes the
//! [`Context`](crate::context::Context) plus the profile it builds for and
//! returns a finished node. They never look at other nodes: dependencies
//! are expressed as `dependsOn` strings and checked later by
//! [`ResourceGraph`](crate::graph::ResourceGraph).
//!
//! # Example
//!
//! ```
//! use kubearm_lib::resources::{ResourceKind, ResourceNode};
//!
//! let nsg = ResourceNode::new(ResourceKind::NetworkSecurityGroup, "[variables('nsgName')]")
//!   .located()
//!   .properties(serde_json::json!({ "securityRules": [] }));
//! assert_eq!(nsg.api_version, "[variables('apiVersionNetwork')]");
//! assert_eq!(nsg.to_json()["type"], "Microsoft.Network/networkSecurityGroups");
//! ```

pub mod compute;
pub mod deployment;
pub mod extension;
pub mod identity;
pub mod loadbalancer;
pub mod network;
pub mod scaleset;
pub mod storage;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::context::Context;
use crate::expr;
use crate::helpers::trim_ssh_keys;
use crate::model::AgentPoolProfile;

/// Kinds of resources the generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
  VirtualMachine,
  ScaleSet,
  NetworkInterface,
  VirtualNetwork,
  LoadBalancer,
  NetworkSecurityGroup,
  StorageAccount,
  RoleAssignment,
  Image,
  Extension,
  AvailabilitySet,
  PublicIpAddress,
  RouteTable,
  UserAssignedIdentity,
  KeyVault,
  Deployment,
  CosmosAccount,
}

impl ResourceKind {
  /// Fully qualified resource type.
  pub fn arm_type(self) -> &'static str {
    match self {
      ResourceKind::VirtualMachine => "Microsoft.Compute/virtualMachines",
      ResourceKind::ScaleSet => "Microsoft.Compute/virtualMachineScaleSets",
      ResourceKind::NetworkInterface => "Microsoft.Network/networkInterfaces",
      ResourceKind::VirtualNetwork => "Microsoft.Network/virtualNetworks",
      ResourceKind::LoadBalancer => "Microsoft.Network/loadBalancers",
      ResourceKind::NetworkSecurityGroup => "Microsoft.Network/networkSecurityGroups",
      ResourceKind::StorageAccount => "Microsoft.Storage/storageAccounts",
      ResourceKind::RoleAssignment => "Microsoft.Authorization/roleAssignments",
      ResourceKind::Image => "Microsoft.Compute/images",
      ResourceKind::Extension => "Microsoft.Compute/virtualMachines/extensions",
      ResourceKind::AvailabilitySet => "Microsoft.Compute/availabilitySets",
      ResourceKind::PublicIpAddress => "Microsoft.Network/publicIPAddresses",
      ResourceKind::RouteTable => "Microsoft.Network/routeTables",
      ResourceKind::UserAssignedIdentity => "Microsoft.ManagedIdentity/userAssignedIdentities",
      ResourceKind::KeyVault => "Microsoft.KeyVault/vaults",
      ResourceKind::Deployment => "Microsoft.Resources/deployments",
      ResourceKind::CosmosAccount => "Microsoft.DocumentDB/databaseAccounts",
    }
  }

  /// Variable holding the default API version for this kind.
  pub fn api_version_variable(self) -> &'static str {
    match self {
      ResourceKind::VirtualMachine
      | ResourceKind::ScaleSet
      | ResourceKind::Image
      | ResourceKind::Extension
      | ResourceKind::AvailabilitySet => "apiVersionCompute",
      ResourceKind::NetworkInterface
      | ResourceKind::VirtualNetwork
      | ResourceKind::LoadBalancer
      | ResourceKind::NetworkSecurityGroup
      | ResourceKind::PublicIpAddress
      | ResourceKind::RouteTable => "apiVersionNetwork",
      ResourceKind::StorageAccount => "apiVersionStorage",
      ResourceKind::RoleAssignment => "apiVersionAuthorizationSystem",
      ResourceKind::UserAssignedIdentity => "apiVersionManagedIdentity",
      ResourceKind::KeyVault => "apiVersionKeyVault",
      ResourceKind::Deployment => "apiVersionDeployments",
      ResourceKind::CosmosAccount => "apiVersionCosmos",
    }
  }

  /// Short label used in summaries.
  pub fn label(self) -> &'static str {
    match self {
      ResourceKind::VirtualMachine => "VirtualMachine",
      ResourceKind::ScaleSet => "ScaleSet",
      ResourceKind::NetworkInterface => "NetworkInterface",
      ResourceKind::VirtualNetwork => "VirtualNetwork",
      ResourceKind::LoadBalancer => "LoadBalancer",
      ResourceKind::NetworkSecurityGroup => "NetworkSecurityGroup",
      ResourceKind::StorageAccount => "StorageAccount",
      ResourceKind::RoleAssignment => "RoleAssignment",
      ResourceKind::Image => "Image",
      ResourceKind::Extension => "Extension",
      ResourceKind::AvailabilitySet => "AvailabilitySet",
      ResourceKind::PublicIpAddress => "PublicIpAddress",
      ResourceKind::RouteTable => "RouteTable",
      ResourceKind::UserAssignedIdentity => "UserAssignedIdentity",
      ResourceKind::KeyVault => "KeyVault",
      ResourceKind::Deployment => "Deployment",
      ResourceKind::CosmosAccount => "CosmosAccount",
    }
  }
}

/// Replica loop of a resource declared once and deployed `count` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyLoop {
  pub name: String,
  pub count: String,
}

/// One resource declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
  pub kind: ResourceKind,
  /// Always a variable reference, never a literal version.
  pub api_version: String,
  pub name: String,
  /// Resource type when it differs from the kind's default.
  pub arm_type: Option<String>,
  pub location: Option<String>,
  /// Ordered, duplicate-free.
  pub depends_on: Vec<String>,
  pub copy: Option<CopyLoop>,
  /// Kind-specific top-level fields (`properties`, `sku`, `identity`, ...).
  pub fields: Map<String, Value>,
}

impl ResourceNode {
  pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      api_version: expr::var_expr(kind.api_version_variable()),
      name: name.into(),
      arm_type: None,
      location: None,
      depends_on: Vec::new(),
      copy: None,
      fields: Map::new(),
    }
  }

  /// Deploy into the cluster location.
  pub fn located(mut self) -> Self {
    self.location = Some(expr::var_expr("location"));
    self
  }

  /// Deploy into an explicit location expression.
  pub fn at(mut self, location: impl Into<String>) -> Self {
    self.location = Some(location.into());
    self
  }

  /// Use a different API version variable than the kind's default.
  pub fn api_version(mut self, variable: &str) -> Self {
    self.api_version = expr::var_expr(variable);
    self
  }

  pub fn arm_type(mut self, arm_type: impl Into<String>) -> Self {
    self.arm_type = Some(arm_type.into());
    self
  }

  /// Add a dependency, keeping the first occurrence of duplicates.
  pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
    let dependency = dependency.into();
    if !self.depends_on.contains(&dependency) {
      self.depends_on.push(dependency);
    }
    self
  }

  pub fn depends_on_all<I, S>(self, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    dependencies.into_iter().fold(self, ResourceNode::depends_on)
  }

  pub fn copy(mut self, name: &str, count: impl Into<String>) -> Self {
    self.copy = Some(CopyLoop {
      name: name.to_string(),
      count: count.into(),
    });
    self
  }

  /// Set a top-level field.
  pub fn with(mut self, key: &str, value: Value) -> Self {
    self.fields.insert(key.to_string(), value);
    self
  }

  pub fn properties(self, properties: Value) -> Self {
    self.with("properties", properties)
  }

  /// The resource type string emitted in the template.
  pub fn resource_type(&self) -> &str {
    self.arm_type.as_deref().unwrap_or(self.kind.arm_type())
  }

  /// Render the node as a template resource object.
  pub fn to_json(&self) -> Value {
    let mut object = self.fields.clone();
    object.insert("apiVersion".into(), Value::String(self.api_version.clone()));
    object.insert("name".into(), Value::String(self.name.clone()));
    object.insert("type".into(), Value::String(self.resource_type().to_string()));
    if let Some(location) = &self.location {
      object.insert("location".into(), Value::String(location.clone()));
    }
    if !self.depends_on.is_empty() {
      object.insert("dependsOn".into(), json!(self.depends_on));
    }
    if let Some(copy) = &self.copy {
      object.insert("copy".into(), json!({ "count": copy.count, "name": copy.name }));
    }
    Value::Object(object)
  }
}

impl Serialize for ResourceNode {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.to_json().serialize(serializer)
  }
}

// ============================================================================
// Shared fragments
// ============================================================================

/// `[concat('<type>/', <name args>)]`, the dependency form naming a sibling.
pub fn dependency(kind: ResourceKind, name_args: &[&str]) -> String {
  let type_prefix = expr::literal(&format!("{}/", kind.arm_type()));
  let mut args = vec![type_prefix.as_str()];
  args.extend_from_slice(name_args);
  expr::concat(&args)
}

/// Copy index of a loop offset by `offset_var`.
pub(crate) fn copy_index(offset_var: &str) -> String {
  format!("copyIndex({})", expr::variable(offset_var))
}

/// Managed identity block for a VM or scale set.
///
/// `None` when managed identity is off. A user-assigned identity is only
/// attached when `allow_user_assigned`; Windows availability-set VMs fall
/// back to system-assigned.
pub(crate) fn identity_block(ctx: &Context<'_>, allow_user_assigned: bool) -> Option<Value> {
  if !ctx.use_managed_identity {
    return None;
  }
  if ctx.user_assigned_identity_enabled && allow_user_assigned {
    let mut ids = Map::new();
    ids.insert(expr::var_expr("userAssignedIDReference"), json!({}));
    Some(json!({ "type": "UserAssigned", "userAssignedIdentities": ids }))
  } else {
    Some(json!({ "type": "SystemAssigned" }))
  }
}

/// Linux SSH configuration: several keys are embedded, one goes through
/// the `sshRSAPublicKey` parameter.
pub(crate) fn linux_configuration(ctx: &Context<'_>) -> Value {
  let keys = trim_ssh_keys(&ctx.model.linux.ssh_public_keys);
  let public_keys: Vec<Value> = if keys.len() > 1 {
    keys
      .iter()
      .map(|key| json!({ "keyData": key, "path": "[variables('sshKeyPath')]" }))
      .collect()
  } else {
    vec![json!({
      "keyData": "[parameters('sshRSAPublicKey')]",
      "path": "[variables('sshKeyPath')]",
    })]
  };
  json!({
    "disablePasswordAuthentication": true,
    "ssh": { "publicKeys": public_keys },
  })
}

/// Custom data payload: the script body, base64-encoded at deploy time.
pub(crate) fn custom_data(body: &str) -> String {
  format!("[base64({})]", expr::literal(body))
}

/// Standard tags of a VM or scale set.
pub(crate) fn node_tags(creation_source: String, pool_name: &str, name_suffix: &str) -> Value {
  json!({
    "aksEngineVersion": "[parameters('aksEngineVersion')]",
    "creationSource": creation_source,
    "orchestrator": "[variables('orchestratorNameVersionTag')]",
    "poolName": pool_name,
    "resourceNameSuffix": name_suffix,
  })
}

const RETRY_FUNCTION: &str = "retrycmd_if_failure() { r=$1; w=$2; t=$3; shift && shift && shift; for i in $(seq 1 $r); do timeout $t ${@}; [ $? -eq 0  ] && break || if [ $i -eq $r ]; then return 1; else sleep $w; fi; done };";
const WAIT_FOR_PROVISION: &str = "for i in $(seq 1 1200); do if [ -f /opt/azure/containers/provision.sh ]; then break; fi; if [ $i -eq 1200 ]; then exit 100; else sleep 1; fi; done;";
const RUN_PROVISION: &str =
  "/usr/bin/nohup /bin/bash -c \"/bin/bash /opt/azure/containers/provision.sh >> /var/log/azure/cluster-provision.log 2>&1\"";

/// Registry reachability probe run before provisioning, empty when
/// outbound internet is blocked.
fn outbound_check(ctx: &Context<'_>) -> String {
  if ctx.block_outbound_internet {
    return String::new();
  }
  "ERR_OUTBOUND_CONN_FAIL=50; retrycmd_if_failure 50 1 3 nc -vz k8s.gcr.io 443 && retrycmd_if_failure 50 1 3 nc -vz gcr.io 443 && retrycmd_if_failure 50 1 3 nc -vz docker.io 443 || exit $ERR_OUTBOUND_CONN_FAIL;".to_string()
}

/// Linux provisioning command; `extra` is spliced between the common
/// parameters and the script invocation.
pub(crate) fn linux_provision_command(ctx: &Context<'_>, extra: &str) -> String {
  format!(
    "[concat('{RETRY_FUNCTION} {} {WAIT_FOR_PROVISION} ', variables('provisionScriptParametersCommon'),{extra} ' {RUN_PROVISION}')]",
    outbound_check(ctx)
  )
}

/// Provisioning command of master nodes.
pub(crate) fn master_provision_command(ctx: &Context<'_>) -> String {
  linux_provision_command(ctx, "' ',variables('provisionScriptParametersMaster'),")
}

/// Provisioning command of Linux agent nodes.
pub(crate) fn agent_provision_command(ctx: &Context<'_>, pool: &AgentPoolProfile) -> String {
  let gpu = pool.is_nvidia_enabled();
  let sgx = pool.is_sgx_enabled();
  linux_provision_command(ctx, &format!("' GPU_NODE={gpu} SGX_NODE={sgx}',"))
}

/// Provisioning command of Windows agent nodes.
pub(crate) fn windows_provision_command() -> String {
  "[concat('powershell.exe -ExecutionPolicy Unrestricted -command \"', '$arguments = ', variables('singleQuote'),'-MasterIP ',variables('kubernetesAPIServerIP'),' -KubeDnsServiceIp ',parameters('kubeDnsServiceIp'),' -MasterFQDNPrefix ',variables('masterFqdnPrefix'),' -Location ',variables('location'),' -AgentKey ',parameters('clientPrivateKey'),' -AADClientId ',variables('servicePrincipalClientId'),' -AADClientSecret ',variables('singleQuote'),variables('singleQuote'),variables('servicePrincipalClientSecret'),variables('singleQuote'),variables('singleQuote'), ' ',variables('singleQuote'), ' ; ', variables('windowsCustomScriptSuffix'), '\" > %SYSTEMDRIVE%\\AzureData\\CustomDataSetupScript.log 2>&1')]".to_string()
}
