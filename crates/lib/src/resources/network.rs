//! Virtual networks, security groups, route tables, public IPs and NICs.

use serde_json::{Value, json};

use super::{ResourceKind, ResourceNode, copy_index, dependency};
use crate::context::Context;
use crate::expr;
use crate::model::AgentPoolProfile;
use crate::names::{PoolVar, pool_var};
use crate::variables::numbered;

fn id(value: &str) -> Value {
  json!({ "id": value })
}

/// The VNet the cluster's NICs wait on: the NSG for custom VNets (the VNet
/// is not ours), the generated VNet otherwise.
pub(crate) fn network_dependency(ctx: &Context<'_>) -> String {
  if ctx.is_custom_vnet {
    expr::var_expr("nsgID")
  } else {
    expr::var_expr("vnetID")
  }
}

fn address_prefix(ctx: &Context<'_>, v4: &str, v6: &str) -> (&'static str, Value) {
  if ctx.is_ipv6_dual_stack {
    ("addressPrefixes", json!([expr::param_expr(v4), expr::param_expr(v6)]))
  } else {
    ("addressPrefix", json!(expr::param_expr(v4)))
  }
}

fn subnet(ctx: &Context<'_>, name: &str, prefix_param: &str) -> Value {
  let (key, prefix) = address_prefix(ctx, prefix_param, &format!("{prefix_param}IPv6"));
  let mut properties = serde_json::Map::new();
  properties.insert(key.to_string(), prefix);
  properties.insert("networkSecurityGroup".into(), id(&expr::var_expr("nsgID")));
  if ctx.require_route_table {
    properties.insert("routeTable".into(), id(&expr::var_expr("routeTableID")));
  }
  json!({ "name": name, "properties": properties })
}

fn vnet_address_space(ctx: &Context<'_>) -> Value {
  let mut prefixes = vec![expr::param_expr("vnetCidr")];
  if ctx.is_ipv6_dual_stack {
    prefixes.push(expr::param_expr("vnetCidrIPv6"));
  }
  json!({ "addressPrefixes": prefixes })
}

fn vnet_base(ctx: &Context<'_>) -> ResourceNode {
  let node = ResourceNode::new(ResourceKind::VirtualNetwork, expr::var_expr("virtualNetworkName"))
    .located()
    .depends_on(dependency(ResourceKind::NetworkSecurityGroup, &[&expr::variable("nsgName")]));
  if ctx.require_route_table {
    node.depends_on(dependency(ResourceKind::RouteTable, &[&expr::variable("routeTableName")]))
  } else {
    node
  }
}

/// Generated VNet of an availability-set control plane, or of a hosted one.
pub fn virtual_network(ctx: &Context<'_>) -> ResourceNode {
  vnet_base(ctx).properties(json!({
    "addressSpace": vnet_address_space(ctx),
    "subnets": [subnet(ctx, &expr::var_expr("subnetName"), "masterSubnet")],
  }))
}

/// Generated VNet of a scale-set control plane: masters and agents get
/// separate subnets.
pub fn scale_set_virtual_network(ctx: &Context<'_>) -> ResourceNode {
  vnet_base(ctx).properties(json!({
    "addressSpace": vnet_address_space(ctx),
    "subnets": [
      subnet(ctx, "subnetmaster", "masterSubnet"),
      subnet(ctx, "subnetagent", "agentSubnet"),
    ],
  }))
}

// ============================================================================
// Security groups and routes
// ============================================================================

fn security_rule(name: &str, description: &str, port: &str, priority: u32) -> Value {
  json!({
    "name": name,
    "properties": {
      "access": "Allow",
      "description": description,
      "destinationAddressPrefix": "*",
      "destinationPortRange": port,
      "direction": "Inbound",
      "priority": priority,
      "protocol": "Tcp",
      "sourceAddressPrefix": "*",
      "sourcePortRange": "*",
    },
  })
}

/// Cluster NSG of a self-hosted control plane.
pub fn security_group(ctx: &Context<'_>) -> ResourceNode {
  let mut rules = vec![
    security_rule("allow_ssh", "Allow SSH traffic to master", "22-22", 101),
    security_rule("allow_kube_tls", "Allow kube-apiserver (tls) traffic to master", "443-443", 100),
  ];
  if ctx.has_windows_pool {
    rules.push(security_rule("allow_rdp", "Allow RDP traffic to master", "3389-3389", 102));
  }
  if ctx.block_outbound_internet {
    rules.push(json!({
      "name": "allow_vnet",
      "properties": {
        "access": "Allow",
        "description": "Allow outbound internet to vnet",
        "destinationAddressPrefix": "[parameters('masterSubnet')]",
        "destinationPortRange": "*",
        "direction": "Outbound",
        "priority": 110,
        "protocol": "*",
        "sourceAddressPrefix": "VirtualNetwork",
        "sourcePortRange": "*",
      },
    }));
    rules.push(json!({
      "name": "block_outbound",
      "properties": {
        "access": "Deny",
        "description": "Block outbound internet from master",
        "destinationAddressPrefix": "*",
        "destinationPortRange": "*",
        "direction": "Outbound",
        "priority": 120,
        "protocol": "*",
        "sourceAddressPrefix": "*",
        "sourcePortRange": "*",
      },
    }));
  }
  ResourceNode::new(ResourceKind::NetworkSecurityGroup, expr::var_expr("nsgName"))
    .located()
    .properties(json!({ "securityRules": rules }))
}

/// Cluster NSG of a hosted control plane; the provider adds rules later.
pub fn hosted_security_group() -> ResourceNode {
  ResourceNode::new(ResourceKind::NetworkSecurityGroup, expr::var_expr("nsgName"))
    .located()
    .properties(json!({ "securityRules": [] }))
}

pub fn jumpbox_security_group() -> ResourceNode {
  ResourceNode::new(
    ResourceKind::NetworkSecurityGroup,
    expr::var_expr("jumpboxNetworkSecurityGroupName"),
  )
  .located()
  .properties(json!({
    "securityRules": [security_rule("default-allow-ssh", "Allow SSH to the jumpbox", "22", 1000)],
  }))
}

pub fn route_table() -> ResourceNode {
  ResourceNode::new(ResourceKind::RouteTable, expr::var_expr("routeTableName")).located()
}

// ============================================================================
// Public IPs
// ============================================================================

/// Public IP fronting the master load balancer. Private clusters only use
/// it for outbound traffic and publish no DNS name.
pub fn master_public_ip(ctx: &Context<'_>) -> ResourceNode {
  let mut properties = json!({ "publicIPAllocationMethod": "Static" });
  if !ctx.is_private_cluster {
    properties["dnsSettings"] = json!({ "domainNameLabel": expr::var_expr("masterFqdnPrefix") });
  }
  ResourceNode::new(ResourceKind::PublicIpAddress, expr::var_expr("masterPublicIPAddressName"))
    .located()
    .with("sku", json!({ "name": expr::var_expr("loadBalancerSku") }))
    .properties(properties)
}

pub fn jumpbox_public_ip() -> ResourceNode {
  ResourceNode::new(ResourceKind::PublicIpAddress, expr::var_expr("jumpboxPublicIpAddressName"))
    .located()
    .with("sku", json!({ "name": "Basic" }))
    .properties(json!({
      "dnsSettings": { "domainNameLabel": expr::var_expr("masterFqdnPrefix") },
      "publicIPAllocationMethod": "Dynamic",
    }))
}

/// Outbound public IPs of the agent standard load balancer, one per
/// configured outbound address.
pub fn agent_outbound_ips(ctx: &Context<'_>) -> Vec<ResourceNode> {
  (1..=ctx.model.orchestrator.load_balancer_outbound_ips.max(1))
    .map(|i| {
      ResourceNode::new(
        ResourceKind::PublicIpAddress,
        expr::var_expr(&numbered("agentPublicIPAddressName", i)),
      )
      .located()
      .with("sku", json!({ "name": "Standard" }))
      .properties(json!({ "publicIPAllocationMethod": "Static" }))
    })
    .collect()
}

// ============================================================================
// Network interfaces
// ============================================================================

fn ipv6_config(subnet_id: &str) -> Value {
  json!({
    "name": "ipconfigv6",
    "properties": {
      "privateIPAddressVersion": "IPv6",
      "subnet": id(subnet_id),
    },
  })
}

/// Backend pools a master NIC joins.
fn master_backend_pools(ctx: &Context<'_>) -> Vec<Value> {
  let mut pools = Vec::new();
  if ctx.has_master_load_balancer() {
    pools.push(id(
      "[concat(variables('masterLbID'), '/backendAddressPools/', variables('masterLbBackendPoolName'))]",
    ));
  }
  if ctx.has_multiple_masters {
    pools.push(id(
      "[concat(variables('masterInternalLbID'), '/backendAddressPools/', variables('masterLbBackendPoolName'))]",
    ));
  }
  pools
}

/// NICs of availability-set masters, one per master past `masterOffset`.
///
/// Public clusters get an SSH NAT rule per master on the master LB. Azure
/// CNI reserves extra secondary addresses for pods; other plugins forward
/// IP traffic instead.
pub fn master_nic(ctx: &Context<'_>, ip_address_count: u32) -> ResourceNode {
  let offset = copy_index("masterOffset");

  let mut primary = json!({
    "loadBalancerBackendAddressPools": master_backend_pools(ctx),
    "primary": true,
    "privateIPAddress": format!("[variables('masterPrivateIpAddrs')[{offset}]]"),
    "privateIPAllocationMethod": "Static",
    "subnet": id(&expr::var_expr("vnetSubnetID")),
  });
  if !ctx.is_private_cluster {
    primary["loadBalancerInboundNatRules"] = json!([id(&format!(
      "[concat(variables('masterLbID'),'/inboundNatRules/SSH-',variables('masterVMNamePrefix'),{offset})]"
    ))]);
  }

  let mut ip_configs = vec![json!({ "name": "ipconfig1", "properties": primary })];
  if ctx.is_azure_cni {
    for i in 2..=ip_address_count {
      ip_configs.push(json!({
        "name": format!("ipconfig{i}"),
        "properties": {
          "primary": false,
          "privateIPAllocationMethod": "Dynamic",
          "subnet": id(&expr::var_expr("vnetSubnetID")),
        },
      }));
    }
  }
  if ctx.is_ipv6_dual_stack {
    ip_configs.push(ipv6_config(&expr::var_expr("vnetSubnetID")));
  }

  let mut properties = json!({ "ipConfigurations": ip_configs });
  if !ctx.is_azure_cni && !ctx.is_azure_stack {
    properties["enableIPForwarding"] = json!(true);
  }
  if ctx.model.linux.custom_nodes_dns.as_deref().is_some_and(|dns| !dns.is_empty()) {
    properties["dnsSettings"] = json!({ "dnsServers": ["[parameters('dnsServer')]"] });
  }
  if ctx.is_custom_vnet {
    properties["networkSecurityGroup"] = id(&expr::var_expr("nsgID"));
  }

  let mut node = ResourceNode::new(
    ResourceKind::NetworkInterface,
    expr::concat(&[&expr::variable("masterVMNamePrefix"), "'nic-'", &offset]),
  )
  .located()
  .copy("nicLoopNode", "[sub(variables('masterCount'), variables('masterOffset'))]")
  .depends_on(network_dependency(ctx));
  if ctx.has_master_load_balancer() {
    node = node.depends_on(expr::var_expr("masterLbName"));
  }
  if ctx.has_multiple_masters {
    node = node.depends_on(expr::var_expr("masterInternalLbName"));
  }
  if ctx.has_cosmos_etcd {
    node = node.depends_on(super::storage::cosmos_dependency());
  }
  node.properties(properties)
}

pub fn jumpbox_nic(ctx: &Context<'_>) -> ResourceNode {
  let mut node = ResourceNode::new(ResourceKind::NetworkInterface, expr::var_expr("jumpboxNetworkInterfaceName"))
    .located()
    .depends_on(dependency(
      ResourceKind::PublicIpAddress,
      &[&expr::variable("jumpboxPublicIpAddressName")],
    ))
    .depends_on(dependency(
      ResourceKind::NetworkSecurityGroup,
      &[&expr::variable("jumpboxNetworkSecurityGroupName")],
    ));
  if !ctx.is_custom_vnet {
    node = node.depends_on(expr::var_expr("vnetID"));
  }
  node.properties(json!({
    "ipConfigurations": [{
      "name": "ipconfig1",
      "properties": {
        "privateIPAllocationMethod": "Dynamic",
        "publicIpAddress": id(&expr::resource_id(
          ResourceKind::PublicIpAddress.arm_type(),
          &[&expr::variable("jumpboxPublicIpAddressName")],
        )),
        "subnet": id(&expr::var_expr("vnetSubnetID")),
      },
    }],
    "networkSecurityGroup": id(&expr::resource_id(
      ResourceKind::NetworkSecurityGroup.arm_type(),
      &[&expr::variable("jumpboxNetworkSecurityGroupName")],
    )),
  }))
}

/// Backend pool of the agent standard load balancer.
pub(crate) fn agent_backend_pool() -> Value {
  id("[concat(variables('agentLbID'), '/backendAddressPools/', variables('agentLbBackendPoolName'))]")
}

/// NICs of an availability-set agent pool.
pub fn agent_nic(ctx: &Context<'_>, pool: &AgentPoolProfile) -> ResourceNode {
  let name = pool.name.as_str();
  let offset = copy_index(&pool_var(name, PoolVar::Offset).to_string());
  let subnet_id = pool_var(name, PoolVar::VnetSubnetId).expr();

  let mut ip_configs: Vec<Value> = (1..=pool.ip_address_count.max(1))
    .map(|i| {
      let mut properties = json!({
        "primary": i == 1,
        "privateIPAllocationMethod": "Dynamic",
        "subnet": id(&subnet_id),
      });
      if i == 1 && ctx.has_agent_load_balancer() {
        properties["loadBalancerBackendAddressPools"] = json!([agent_backend_pool()]);
      }
      json!({ "name": format!("ipconfig{i}"), "properties": properties })
    })
    .collect();
  if ctx.is_ipv6_dual_stack {
    ip_configs.push(ipv6_config(&subnet_id));
  }

  let mut properties = json!({
    "enableAcceleratedNetworking": pool.accelerated_networking,
    "ipConfigurations": ip_configs,
  });
  if !ctx.is_azure_cni && !ctx.is_azure_stack {
    properties["enableIPForwarding"] = json!(true);
  }
  if ctx.is_custom_vnet {
    properties["networkSecurityGroup"] = id(&expr::var_expr("nsgID"));
  }

  let mut node = ResourceNode::new(
    ResourceKind::NetworkInterface,
    expr::concat(&[&pool_var(name, PoolVar::VmNamePrefix).reference(), "'nic-'", &offset]),
  )
  .located()
  .copy(
    "loop",
    format!(
      "[sub({}, {})]",
      pool_var(name, PoolVar::Count).reference(),
      pool_var(name, PoolVar::Offset).reference()
    ),
  )
  .depends_on(network_dependency(ctx));
  if ctx.has_agent_load_balancer() {
    node = node.depends_on(expr::var_expr("agentLbID"));
  }
  node.properties(properties)
}
