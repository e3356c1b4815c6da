//! Master public, master internal and agent outbound load balancers.
//!
//! The public master load balancer of a reachable cluster carries every
//! component together: frontend, backend pool, health probe, inbound SSH
//! NAT (a pool for scale sets, one rule per master otherwise) and the HTTPS
//! rule. A private cluster keeps only the frontend and backend, plus an
//! outbound rule so masters can still reach the internet.

use serde_json::{Value, json};

use super::network::network_dependency;
use super::{ResourceKind, ResourceNode, dependency};
use crate::context::Context;
use crate::expr;
use crate::variables::numbered;

/// Frontend ports of the per-master SSH NAT rules.
pub const SSH_NAT_PORTS: [u32; 5] = [22, 2201, 2202, 2203, 2204];

const MASTER_BACKEND_POOL: &str =
  "[concat(variables('masterLbID'), '/backendAddressPools/', variables('masterLbBackendPoolName'))]";
const INTERNAL_BACKEND_POOL: &str =
  "[concat(variables('masterInternalLbID'), '/backendAddressPools/', variables('masterLbBackendPoolName'))]";
const AGENT_BACKEND_POOL: &str =
  "[concat(variables('agentLbID'), '/backendAddressPools/', variables('agentLbBackendPoolName'))]";

fn id(value: &str) -> Value {
  json!({ "id": value })
}

fn lb_sku() -> Value {
  json!({ "name": expr::var_expr("loadBalancerSku") })
}

fn balancing_rule(name: &str, protocol: &str, frontend: &str, backend: &str, ports: (u32, u32), probe: &str) -> Value {
  json!({
    "name": name,
    "properties": {
      "backendAddressPool": id(backend),
      "backendPort": ports.1,
      "enableFloatingIP": false,
      "frontendIPConfiguration": id(frontend),
      "frontendPort": ports.0,
      "idleTimeoutInMinutes": 5,
      "loadDistribution": "Default",
      "probe": id(probe),
      "protocol": protocol,
    },
  })
}

fn tcp_probe(port: u32) -> Value {
  json!({
    "name": "tcpHTTPSProbe",
    "properties": {
      "intervalInSeconds": 5,
      "numberOfProbes": 2,
      "port": port,
      "protocol": "Tcp",
    },
  })
}

/// TCP reset on idle outbound flows needs 1.13.7+, 1.14.3+ or 1.15.0+.
fn supports_tcp_reset(version: &str) -> bool {
  let mut parts = version
    .trim_start_matches('v')
    .split(['.', '-', '+'])
    .map(|part| part.parse::<u32>().unwrap_or(0));
  let major = parts.next().unwrap_or(0);
  let minor = parts.next().unwrap_or(0);
  let patch = parts.next().unwrap_or(0);
  match (major, minor) {
    (1, 13) => patch >= 7,
    (1, 14) => patch >= 3,
    (1, m) => m > 13,
    (m, _) => m > 1,
  }
}

fn outbound_rule(ctx: &Context<'_>, frontends: Vec<Value>, backend: &str) -> Value {
  let mut properties = json!({
    "allocatedOutboundPorts": 0,
    "backendAddressPool": id(backend),
    "frontendIPConfigurations": frontends,
    "idleTimeoutInMinutes": ctx.model.orchestrator.outbound_rule_idle_timeout_in_minutes,
    "protocol": "All",
  });
  if supports_tcp_reset(&ctx.model.orchestrator.version) {
    properties["enableTcpReset"] = json!(true);
  }
  json!({ "name": "LBOutboundRule", "properties": properties })
}

/// Public load balancer in front of the masters.
pub fn master_load_balancer(ctx: &Context<'_>, master_count: u32) -> ResourceNode {
  let frontend = expr::var_expr("masterLbIPConfigID");
  let mut properties = json!({
    "backendAddressPools": [{ "name": expr::var_expr("masterLbBackendPoolName") }],
    "frontendIPConfigurations": [{
      "name": expr::var_expr("masterLbIPConfigName"),
      "properties": {
        "publicIPAddress": id(&expr::resource_id(
          ResourceKind::PublicIpAddress.arm_type(),
          &[&expr::variable("masterPublicIPAddressName")],
        )),
      },
    }],
  });

  if ctx.is_private_cluster {
    properties["outboundRules"] = json!([outbound_rule(ctx, vec![id(&frontend)], MASTER_BACKEND_POOL)]);
  } else {
    let probe = "[concat(variables('masterLbID'),'/probes/tcpHTTPSProbe')]";
    let mut rules = vec![balancing_rule("LBRuleHTTPS", "Tcp", &frontend, MASTER_BACKEND_POOL, (443, 443), probe)];
    if ctx.is_standard_load_balancer {
      rules.push(balancing_rule("LBRuleUDP", "Udp", &frontend, MASTER_BACKEND_POOL, (1123, 1123), probe));
    }
    properties["loadBalancingRules"] = json!(rules);
    properties["probes"] = json!([tcp_probe(443)]);

    if ctx.is_master_scale_set {
      properties["inboundNatPools"] = json!([{
        "name": "[concat('SSH-', variables('masterVMNamePrefix'), 'natpools')]",
        "properties": {
          "backendPort": 22,
          "enableFloatingIP": false,
          "frontendIPConfiguration": id(&frontend),
          "frontendPortRangeEnd": 50119,
          "frontendPortRangeStart": 50001,
          "protocol": "Tcp",
        },
      }]);
    } else {
      let nat_rules: Vec<Value> = SSH_NAT_PORTS
        .iter()
        .take(master_count as usize)
        .enumerate()
        .map(|(i, port)| {
          json!({
            "name": format!("[concat('SSH-', variables('masterVMNamePrefix'), {i})]"),
            "properties": {
              "backendPort": 22,
              "enableFloatingIP": false,
              "frontendIPConfiguration": id(&frontend),
              "frontendPort": port,
              "protocol": "Tcp",
            },
          })
        })
        .collect();
      properties["inboundNatRules"] = json!(nat_rules);
    }
  }

  ResourceNode::new(ResourceKind::LoadBalancer, expr::var_expr("masterLbName"))
    .located()
    .depends_on(dependency(
      ResourceKind::PublicIpAddress,
      &[&expr::variable("masterPublicIPAddressName")],
    ))
    .with("sku", lb_sku())
    .properties(properties)
}

/// Internal load balancer spreading API server traffic over several masters.
pub fn master_internal_load_balancer(ctx: &Context<'_>) -> ResourceNode {
  let subnet = if ctx.is_master_scale_set {
    expr::var_expr("vnetSubnetIDMaster")
  } else {
    expr::var_expr("vnetSubnetID")
  };
  let frontend = expr::var_expr("masterInternalLbIPConfigID");
  let probe = "[concat(variables('masterInternalLbID'),'/probes/tcpHTTPSProbe')]";
  let mut rules = vec![balancing_rule(
    "InternalLBRuleHTTPS",
    "Tcp",
    &frontend,
    INTERNAL_BACKEND_POOL,
    (443, 4443),
    probe,
  )];
  if ctx.is_standard_load_balancer {
    rules.push(balancing_rule("LBRuleUDP", "Udp", &frontend, INTERNAL_BACKEND_POOL, (1123, 1123), probe));
  }

  ResourceNode::new(ResourceKind::LoadBalancer, expr::var_expr("masterInternalLbName"))
    .located()
    .depends_on(network_dependency(ctx))
    .with("sku", lb_sku())
    .properties(json!({
      "backendAddressPools": [{ "name": expr::var_expr("masterLbBackendPoolName") }],
      "frontendIPConfigurations": [{
        "name": expr::var_expr("masterInternalLbIPConfigName"),
        "properties": {
          "privateIPAddress": expr::var_expr("kubernetesAPIServerIP"),
          "privateIPAllocationMethod": "Static",
          "subnet": id(&subnet),
        },
      }],
      "loadBalancingRules": rules,
      "probes": [tcp_probe(4443)],
    }))
}

/// Standard load balancer giving agents outbound connectivity through one
/// frontend per outbound public IP.
pub fn agent_load_balancer(ctx: &Context<'_>) -> ResourceNode {
  let count = ctx.model.orchestrator.load_balancer_outbound_ips.max(1);
  let mut node = ResourceNode::new(ResourceKind::LoadBalancer, expr::var_expr("agentLbName")).located();
  let mut frontends = Vec::new();
  let mut frontend_ids = Vec::new();

  for i in 1..=count {
    let ip_var = numbered("agentPublicIPAddressName", i);
    node = node.depends_on(dependency(ResourceKind::PublicIpAddress, &[&expr::variable(&ip_var)]));
    frontends.push(json!({
      "name": expr::var_expr(&numbered("agentLbIPConfigName", i)),
      "properties": {
        "publicIPAddress": id(&expr::resource_id(
          ResourceKind::PublicIpAddress.arm_type(),
          &[&expr::variable(&ip_var)],
        )),
      },
    }));
    frontend_ids.push(id(&expr::var_expr(&numbered("agentLbIPConfigID", i))));
  }

  node.with("sku", lb_sku()).properties(json!({
    "backendAddressPools": [{ "name": expr::var_expr("agentLbBackendPoolName") }],
    "frontendIPConfigurations": frontends,
    "outboundRules": [outbound_rule(ctx, frontend_ids, AGENT_BACKEND_POOL)],
  }))
}
