//! Network identifiers: VNet, subnet, NSG, route table, load balancers and
//! the primary set the cloud provider treats as the cluster's node group.

use super::VariableMap;
use crate::context::Context;
use crate::names::{ORCHESTRATOR_NAME, agent_vm_prefix, resource_prefix};

/// Segment positions inside a subnet resource ID.
pub(crate) const VNET_RESOURCE_GROUP_SEGMENT: usize = 4;
pub(crate) const VNET_NAME_SEGMENT: usize = 8;
pub(crate) const SUBNET_NAME_SEGMENT: usize = 10;

/// Literal network names known at generation time.
///
/// These feed both variables and the provisioning parameter string, which
/// needs them as plain text rather than expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClusterMetadata {
  pub subnet_name: String,
  pub nsg_name: String,
  pub route_table_name: String,
  pub virtual_network_name: String,
  pub virtual_network_resource_group: String,
  pub primary_availability_set_name: String,
  pub primary_scale_set_name: String,
  pub vm_type: &'static str,
}

fn segment(id: &str, index: usize) -> String {
  id.split('/').nth(index).unwrap_or_default().to_string()
}

impl ClusterMetadata {
  pub(crate) fn new(ctx: &Context<'_>) -> Self {
    let model = ctx.model;
    let cluster_id = model.cluster_id.as_str();
    let prefix = resource_prefix(cluster_id, ctx.is_hosted_master);

    // Self-hosted clusters take the VNet from the master subnet, hosted
    // clusters from the first pool's.
    let custom_subnet = match ctx.master() {
      Some(master) => master.vnet_subnet_id.as_deref().filter(|id| !id.is_empty()),
      None => ctx
        .pools()
        .first()
        .and_then(|p| p.vnet_subnet_id.as_deref())
        .filter(|id| !id.is_empty()),
    };

    let subnet_name = match (custom_subnet, ctx.is_master_scale_set) {
      (Some(id), _) => segment(id, SUBNET_NAME_SEGMENT),
      (None, true) => "subnetmaster".to_string(),
      (None, false) => format!("{ORCHESTRATOR_NAME}-subnet"),
    };
    let (virtual_network_name, virtual_network_resource_group) = match custom_subnet {
      Some(id) => (segment(id, VNET_NAME_SEGMENT), segment(id, VNET_RESOURCE_GROUP_SEGMENT)),
      None => (format!("{ORCHESTRATOR_NAME}-vnet-{cluster_id}"), String::new()),
    };

    let first = ctx.pools().first();
    let primary_availability_set_name = first
      .filter(|p| p.is_availability_set())
      .map(|p| format!("{}-availabilitySet-{cluster_id}", p.name))
      .unwrap_or_default();
    let primary_scale_set_name = first
      .filter(|p| p.is_scale_set())
      .map(|p| agent_vm_prefix(cluster_id, p, 0))
      .unwrap_or_default();

    Self {
      subnet_name,
      nsg_name: format!("{prefix}nsg"),
      route_table_name: format!("{prefix}routetable"),
      virtual_network_name,
      virtual_network_resource_group,
      primary_availability_set_name,
      primary_scale_set_name,
      vm_type: if model.any_pool_is_scale_set() { "vmss" } else { "standard" },
    }
  }
}

pub(super) fn derive(ctx: &Context<'_>, metadata: &ClusterMetadata) -> VariableMap {
  let mut vars = VariableMap::new();
  vars.insert("vnetNameResourceSegmentIndex", VNET_NAME_SEGMENT);
  vars.insert("vnetResourceGroupNameResourceSegmentIndex", VNET_RESOURCE_GROUP_SEGMENT);
  vars.insert("subnetName", metadata.subnet_name.as_str());
  vars.insert("vmType", metadata.vm_type);

  // ==========================================================================
  // VNet and subnet IDs
  // ==========================================================================

  let generated_vnet_name = "[concat(parameters('orchestratorName'), '-vnet-', parameters('nameSuffix'))]";
  let vnet_id = "[resourceId('Microsoft.Network/virtualNetworks',variables('virtualNetworkName'))]";

  match (ctx.is_hosted_master, ctx.is_custom_vnet, ctx.is_master_scale_set) {
    (false, true, scale_set) => {
      if scale_set {
        vars.insert("vnetSubnetID", "[parameters('agentVnetSubnetID')]");
        vars.insert("vnetSubnetIDMaster", "[parameters('masterVnetSubnetID')]");
      } else {
        vars.insert("vnetSubnetID", "[parameters('masterVnetSubnetID')]");
      }
      vars.insert(
        "virtualNetworkName",
        "[split(parameters('masterVnetSubnetID'), '/')[variables('vnetNameResourceSegmentIndex')]]",
      );
      vars.insert(
        "virtualNetworkResourceGroupName",
        "[split(parameters('masterVnetSubnetID'), '/')[variables('vnetResourceGroupNameResourceSegmentIndex')]]",
      );
    }
    (false, false, scale_set) => {
      if scale_set {
        vars.insert("vnetSubnetID", "[concat(variables('vnetID'),'/subnets/subnetagent')]");
        vars.insert("vnetSubnetIDMaster", "[concat(variables('vnetID'),'/subnets/subnetmaster')]");
      } else {
        vars.insert("vnetSubnetID", "[concat(variables('vnetID'),'/subnets/',variables('subnetName'))]");
      }
      vars.insert("virtualNetworkName", generated_vnet_name);
      vars.insert("vnetID", vnet_id);
      vars.insert("virtualNetworkResourceGroupName", "''");
    }
    (true, true, _) => {
      if let Some(pool) = ctx.pools().first() {
        vars.insert("vnetSubnetID", format!("[parameters('{}VnetSubnetID')]", pool.name));
      }
      vars.insert(
        "virtualNetworkName",
        "[split(variables('vnetSubnetID'), '/')[variables('vnetNameResourceSegmentIndex')]]",
      );
      vars.insert(
        "virtualNetworkResourceGroupName",
        "[split(variables('vnetSubnetID'), '/')[variables('vnetResourceGroupNameResourceSegmentIndex')]]",
      );
    }
    (true, false, _) => {
      vars.insert("vnetID", vnet_id);
      vars.insert("vnetSubnetID", "[concat(variables('vnetID'),'/subnets/',variables('subnetName'))]");
      vars.insert("virtualNetworkName", generated_vnet_name);
      vars.insert("virtualNetworkResourceGroupName", "");
    }
  }

  // ==========================================================================
  // NSG and route table
  // ==========================================================================

  if ctx.is_hosted_master {
    vars.insert(
      "agentNamePrefix",
      "[concat(parameters('orchestratorName'), '-agentpool-', parameters('nameSuffix'), '-')]",
    );
    vars.insert("nsgName", "[concat(variables('agentNamePrefix'), 'nsg')]");
    vars.insert("routeTableName", "[concat(variables('agentNamePrefix'), 'routetable')]");
    vars.insert("kubernetesAPIServerIP", "[parameters('kubernetesEndpoint')]");
  } else {
    vars.insert("nsgName", "[concat(variables('masterVMNamePrefix'), 'nsg')]");
    vars.insert("routeTableName", "[concat(variables('masterVMNamePrefix'),'routetable')]");
  }
  vars.insert("nsgID", "[resourceId('Microsoft.Network/networkSecurityGroups',variables('nsgName'))]");
  vars.insert("routeTableID", "[resourceId('Microsoft.Network/routeTables', variables('routeTableName'))]");

  // ==========================================================================
  // Primary node group
  // ==========================================================================

  let primary_availability_set = match ctx.pools().first() {
    Some(pool) if pool.is_availability_set() => {
      format!("[concat('{}-availabilitySet-',parameters('nameSuffix'))]", pool.name)
    }
    _ => String::new(),
  };
  vars.insert("primaryAvailabilitySetName", primary_availability_set);
  vars.insert("primaryScaleSetName", metadata.primary_scale_set_name.as_str());

  // ==========================================================================
  // Load balancers
  // ==========================================================================

  if ctx.has_agent_load_balancer() {
    derive_agent_load_balancer(ctx, &mut vars);
  }
  if ctx.has_master_load_balancer() {
    vars.insert(
      "masterPublicIPAddressName",
      "[concat(parameters('orchestratorName'), '-master-ip-', variables('masterFqdnPrefix'), '-', parameters('nameSuffix'))]",
    );
    vars.insert("masterLbID", "[resourceId('Microsoft.Network/loadBalancers',variables('masterLbName'))]");
    vars.insert(
      "masterLbIPConfigID",
      "[concat(variables('masterLbID'),'/frontendIPConfigurations/', variables('masterLbIPConfigName'))]",
    );
    vars.insert(
      "masterLbIPConfigName",
      "[concat(parameters('orchestratorName'), '-master-lbFrontEnd-', parameters('nameSuffix'))]",
    );
    vars.insert(
      "masterLbName",
      "[concat(parameters('orchestratorName'), '-master-lb-', parameters('nameSuffix'))]",
    );
  }
  if !ctx.is_hosted_master {
    vars.insert(
      "masterLbBackendPoolName",
      "[concat(parameters('orchestratorName'), '-master-pool-', parameters('nameSuffix'))]",
    );
  }

  vars
}

/// Variable name of the `index`-th (1-based) outbound item: `name`, `name2`, ...
pub(crate) fn numbered(name: &str, index: u32) -> String {
  if index > 1 { format!("{name}{index}") } else { name.to_string() }
}

fn derive_agent_load_balancer(ctx: &Context<'_>, vars: &mut VariableMap) {
  vars.insert("agentLbID", "[resourceId('Microsoft.Network/loadBalancers',variables('agentLbName'))]");
  vars.insert("agentLbName", "[parameters('masterEndpointDNSNamePrefix')]");
  vars.insert("agentLbBackendPoolName", "[parameters('masterEndpointDNSNamePrefix')]");

  for i in 1..=ctx.model.orchestrator.load_balancer_outbound_ips.max(1) {
    let ip_name = numbered("agent-ip-outbound", i);
    let config_name = numbered("agent-outbound", i);
    let config_name_var = numbered("agentLbIPConfigName", i);
    vars.insert(
      numbered("agentPublicIPAddressName", i),
      format!("[concat(parameters('orchestratorName'), '-{ip_name}')]"),
    );
    vars.insert(
      numbered("agentLbIPConfigID", i),
      format!("[concat(variables('agentLbID'),'/frontendIPConfigurations/', variables('{config_name_var}'))]"),
    );
    vars.insert(
      config_name_var,
      format!("[concat(parameters('orchestratorName'), '-{config_name}')]"),
    );
  }
}
