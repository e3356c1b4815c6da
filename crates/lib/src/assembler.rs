//! Resource assembly and template generation.
//!
//! [`assemble_resources`] decides which resources a cluster needs and emits
//! them in a fixed order: telemetry, identity, the agents' standard load
//! balancer, every agent pool in input order, then the control plane.
//! [`generate`] runs the whole pipeline: derive variables, assemble, check
//! every variable reference, and verify the dependency graph.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::assembler::generate;
//! use kubearm_lib::model::ClusterModel;
//! use kubearm_lib::scripts::BuiltinScripts;
//!
//! let model = ClusterModel::from_json(r#"{
//!   "clusterId": "12345678",
//!   "orchestrator": { "version": "1.18.8" },
//!   "master": { "count": 1, "dnsPrefix": "mycluster" },
//!   "agentPools": [{ "name": "agentpool1", "vmSize": "Standard_D2_v3" }]
//! }"#).unwrap();
//!
//! let template = generate(&model, &BuiltinScripts).unwrap();
//! assert!(template.variables.contains("masterVMNamePrefix"));
//! assert!(!template.resources.is_empty());
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::context::Context;
use crate::error::GenerateError;
use crate::expr::value_variable_references;
use crate::graph::ResourceGraph;
use crate::model::{AgentPoolProfile, ClusterModel, MasterProfile};
use crate::resources::identity::IdentityRole;
use crate::resources::{
  ResourceNode, compute, deployment, extension, identity, loadbalancer, network, scaleset, storage,
};
use crate::scripts::ScriptProvider;
use crate::template::Template;
use crate::variables::{self, VariableMap};

/// Resources emitted so far, logged one bundle at a time.
#[derive(Default)]
struct Assembly {
  resources: Vec<ResourceNode>,
}

impl Assembly {
  fn bundle(&mut self, label: &str, nodes: Vec<ResourceNode>) {
    if nodes.is_empty() {
      return;
    }
    debug!(bundle = label, count = nodes.len(), "assembled resources");
    self.resources.extend(nodes);
  }
}

/// Assemble every resource of the cluster, in emission order.
///
/// # Errors
///
/// Returns `MissingMasterProfile` when a self-hosted cluster has no master
/// profile.
pub fn assemble_resources(ctx: &Context<'_>) -> Result<Vec<ResourceNode>, GenerateError> {
  let mut assembly = Assembly::default();

  if ctx.is_azure_stack
    && ctx.model.feature_flags.enable_telemetry
    && let Some(pid) = ctx
      .model
      .custom_cloud
      .as_ref()
      .and_then(|cloud| cloud.telemetry_pid.as_deref())
      .filter(|pid| !pid.is_empty())
  {
    assembly.bundle("telemetry", vec![deployment::telemetry_deployment(pid)]);
  }

  if ctx.user_assigned_identity_enabled {
    let mut nodes = Vec::new();
    if ctx.model.identity.creates_user_assigned_identity() {
      nodes.push(identity::user_assigned_identity());
    }
    let role = if ctx.is_hosted_master {
      IdentityRole::Reader
    } else {
      IdentityRole::Contributor
    };
    nodes.push(identity::user_assigned_role_assignment(role));
    assembly.bundle("identity", nodes);
  }

  if ctx.has_agent_load_balancer() {
    let mut nodes = network::agent_outbound_ips(ctx);
    nodes.push(loadbalancer::agent_load_balancer(ctx));
    assembly.bundle("agent load balancer", nodes);
  }

  for pool in ctx.pools() {
    assembly.bundle(&pool.name, pool_resources(ctx, pool));
  }

  if ctx.is_hosted_master {
    assembly.bundle("hosted control plane", hosted_master_resources(ctx));
  } else {
    let master = ctx.self_hosted_master()?;
    if ctx.is_master_scale_set {
      assembly.bundle("master scale set", master_scale_set_resources(ctx, master));
    } else {
      assembly.bundle("master availability set", master_availability_set_resources(ctx, master));
    }
  }

  Ok(assembly.resources)
}

fn pool_resources(ctx: &Context<'_>, pool: &AgentPoolProfile) -> Vec<ResourceNode> {
  let mut nodes = Vec::new();
  if pool.is_windows() && ctx.model.has_windows_custom_image() {
    nodes.push(compute::windows_image(pool));
  }

  if pool.is_scale_set() {
    if ctx.system_assigned_identity() {
      nodes.push(identity::scale_set_system_role_assignment(pool));
    }
    nodes.push(scaleset::agent_scale_set(ctx, pool));
    return nodes;
  }

  nodes.push(network::agent_nic(ctx, pool));
  if pool.is_storage_account() {
    nodes.push(storage::agent_storage_accounts(ctx, pool, false));
    if pool.has_disks() {
      nodes.push(storage::agent_storage_accounts(ctx, pool, true));
    }
  }
  nodes.push(compute::agent_availability_set(pool));
  nodes.push(compute::agent_vm(ctx, pool));
  if ctx.system_assigned_identity() {
    nodes.push(identity::agent_system_role_assignment(pool));
  }
  nodes.push(extension::agent_custom_script(ctx, pool));
  if ctx.model.is_billing_enabled() {
    nodes.push(extension::agent_billing(ctx, pool));
  }
  nodes
}

fn hosted_master_resources(ctx: &Context<'_>) -> Vec<ResourceNode> {
  let mut nodes = Vec::new();
  if !ctx.is_custom_vnet {
    nodes.push(network::virtual_network(ctx));
  }
  if ctx.require_route_table {
    nodes.push(network::route_table());
  }
  nodes.push(network::hosted_security_group());
  nodes
}

fn key_vault_resources(ctx: &Context<'_>) -> Vec<ResourceNode> {
  if ctx.kms_enabled {
    vec![storage::key_vault_storage_account(), identity::cluster_key_vault()]
  } else {
    Vec::new()
  }
}

fn master_availability_set_resources(ctx: &Context<'_>, master: &MasterProfile) -> Vec<ResourceNode> {
  let mut nodes = Vec::new();
  if master.is_storage_account() {
    nodes.push(compute::master_availability_set(master));
    nodes.push(storage::master_storage_account(ctx));
  } else if !master.has_availability_zones() {
    nodes.push(compute::master_availability_set(master));
  }

  if !ctx.is_custom_vnet {
    nodes.push(network::virtual_network(ctx));
  }
  nodes.push(network::security_group(ctx));
  if ctx.require_route_table {
    nodes.push(network::route_table());
  }
  if ctx.has_cosmos_etcd {
    nodes.push(storage::cosmos_account());
  }

  if ctx.has_master_load_balancer() {
    nodes.push(network::master_public_ip(ctx));
    nodes.push(loadbalancer::master_load_balancer(ctx, master.count));
  }
  nodes.push(network::master_nic(ctx, master.ip_address_count));

  if ctx.provision_jumpbox {
    nodes.push(compute::jumpbox_vm(ctx));
    let managed = ctx
      .model
      .jumpbox()
      .is_some_and(|j| j.storage_backend == crate::model::StorageBackend::ManagedDisks);
    if !managed {
      nodes.push(storage::jumpbox_storage_account());
    }
    nodes.push(network::jumpbox_security_group());
    nodes.push(network::jumpbox_nic(ctx));
    nodes.push(network::jumpbox_public_ip());
  }

  if ctx.has_multiple_masters {
    nodes.push(loadbalancer::master_internal_load_balancer(ctx));
  }
  nodes.extend(key_vault_resources(ctx));

  nodes.push(compute::master_vm(ctx, master));
  if ctx.system_assigned_identity() {
    nodes.push(identity::master_system_role_assignment());
  }
  nodes.push(extension::master_custom_script(ctx));
  if ctx.model.is_billing_enabled() {
    nodes.push(extension::master_billing());
  }
  nodes
}

fn master_scale_set_resources(ctx: &Context<'_>, master: &MasterProfile) -> Vec<ResourceNode> {
  let mut nodes = vec![network::security_group(ctx)];
  if ctx.require_route_table {
    nodes.push(network::route_table());
  }
  if !ctx.is_custom_vnet {
    nodes.push(network::scale_set_virtual_network(ctx));
  }
  if ctx.has_multiple_masters {
    nodes.push(loadbalancer::master_internal_load_balancer(ctx));
  }
  nodes.push(network::master_public_ip(ctx));
  nodes.push(loadbalancer::master_load_balancer(ctx, master.count));
  if ctx.has_cosmos_etcd {
    nodes.push(storage::cosmos_account());
  }
  nodes.extend(key_vault_resources(ctx));
  nodes.push(scaleset::master_scale_set(ctx, master));
  nodes
}

/// Fail on the first `variables('X')` a resource reads that the map lacks.
///
/// # Errors
///
/// Returns `DanglingReference` naming the resource and the missing variable.
pub fn check_resource_references(resources: &[ResourceNode], vars: &VariableMap) -> Result<(), GenerateError> {
  for node in resources {
    for name in value_variable_references(&node.to_json())? {
      if !vars.contains(&name) {
        return Err(GenerateError::DanglingReference {
          referrer: node.name.clone(),
          missing: name,
        });
      }
    }
  }
  Ok(())
}

/// Generate the complete template of a cluster.
///
/// # Errors
///
/// Fails when the model is rejected, when variable derivation fails, when a
/// resource references an undefined variable, or when the resource
/// dependencies form a cycle.
pub fn generate(model: &ClusterModel, scripts: &dyn ScriptProvider) -> Result<Template, GenerateError> {
  let ctx = Context::new(model, scripts)?;
  let vars = variables::derive(&ctx)?;
  let resources = assemble_resources(&ctx)?;
  check_resource_references(&resources, &vars)?;
  let graph = ResourceGraph::build(&resources, &vars)?;

  let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
  for node in &resources {
    *kinds.entry(node.kind.label()).or_default() += 1;
  }
  info!(
    variables = vars.len(),
    resources = resources.len(),
    dependencies = graph.edge_count(),
    external = graph.external().len(),
    kinds = ?kinds,
    "generated template"
  );

  Ok(Template {
    variables: vars,
    resources,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resources::ResourceKind;
  use crate::scripts::BuiltinScripts;

  fn model(json: &str) -> ClusterModel {
    ClusterModel::from_json(json).unwrap()
  }

  fn kinds(resources: &[ResourceNode]) -> Vec<ResourceKind> {
    resources.iter().map(|node| node.kind).collect()
  }

  // ==========================================================================
  // Ordering
  // ==========================================================================

  #[test]
  fn pools_precede_master() {
    let m = model(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" },
           "master": { "count": 1, "dnsPrefix": "c" },
           "agentPools": [{ "name": "p", "vmSize": "Standard_D2_v3" }] }"#,
    );
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let resources = assemble_resources(&ctx).unwrap();
    assert_eq!(
      kinds(&resources),
      vec![
        ResourceKind::NetworkInterface,
        ResourceKind::AvailabilitySet,
        ResourceKind::VirtualMachine,
        ResourceKind::Extension,
        ResourceKind::Extension,
        ResourceKind::AvailabilitySet,
        ResourceKind::VirtualNetwork,
        ResourceKind::NetworkSecurityGroup,
        ResourceKind::RouteTable,
        ResourceKind::PublicIpAddress,
        ResourceKind::LoadBalancer,
        ResourceKind::NetworkInterface,
        ResourceKind::VirtualMachine,
        ResourceKind::Extension,
        ResourceKind::Extension,
      ]
    );
  }

  #[test]
  fn identity_comes_first() {
    let m = model(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" },
           "hostedMaster": { "dnsPrefix": "h" },
           "identity": { "useManagedIdentity": true, "userAssignedId": "uai" },
           "agentPools": [{ "name": "p", "vmSize": "Standard_D2_v3" }] }"#,
    );
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let resources = assemble_resources(&ctx).unwrap();
    assert_eq!(resources[0].kind, ResourceKind::UserAssignedIdentity);
    assert_eq!(resources[1].kind, ResourceKind::RoleAssignment);
    assert_eq!(
      resources[1].fields["properties"]["roleDefinitionId"],
      "[variables('readerRoleDefinitionId')]"
    );
    assert_eq!(resources.last().unwrap().kind, ResourceKind::NetworkSecurityGroup);
  }

  #[test]
  fn system_identity_adds_role_per_set() {
    let m = model(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" },
           "master": { "count": 1, "dnsPrefix": "c" },
           "identity": { "useManagedIdentity": true },
           "agentPools": [{ "name": "p", "vmSize": "Standard_D2_v3" }] }"#,
    );
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let roles = assemble_resources(&ctx)
      .unwrap()
      .into_iter()
      .filter(|node| node.kind == ResourceKind::RoleAssignment)
      .count();
    assert_eq!(roles, 2);
  }

  // ==========================================================================
  // Reference checking
  // ==========================================================================

  #[test]
  fn resource_reference_check_catches_missing_variables() {
    let node = ResourceNode::new(ResourceKind::RouteTable, "[variables('routeTableName')]");
    let mut vars = VariableMap::new();
    vars.insert("apiVersionNetwork", "2018-08-01");
    let err = check_resource_references(&[node], &vars).unwrap_err();
    assert!(matches!(
      err,
      GenerateError::DanglingReference { ref missing, .. } if missing == "routeTableName"
    ));
  }

  #[test]
  fn generate_rejects_unsupported_master_count() {
    let m = model(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" },
           "master": { "count": 2, "dnsPrefix": "c" } }"#,
    );
    assert!(matches!(
      generate(&m, &BuiltinScripts),
      Err(GenerateError::UnsupportedMasterCount(2))
    ));
  }
}
