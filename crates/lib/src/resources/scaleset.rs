//! Scale sets for masters and agent pools.
//!
//! A scale set carries its NIC, OS profile and extensions inline, so these
//! builders produce a single node where the availability-set path produces
//! four (NIC, VM, CSE, billing).

use serde_json::{Value, json};

use super::compute::{linux_image_reference, windows_image_reference};
use super::network::{agent_backend_pool, network_dependency};
use super::storage::cosmos_dependency;
use super::{
  ResourceKind, ResourceNode, agent_provision_command, custom_data, identity_block, linux_configuration,
  master_provision_command, node_tags, windows_provision_command,
};
use crate::context::Context;
use crate::expr;
use crate::model::{AgentPoolProfile, MasterProfile};
use crate::names::{PoolVar, custom_image_name, pool_var};
use crate::scripts::Script;

fn id(value: &str) -> Value {
  json!({ "id": value })
}

/// A scale set extension; `settings` is always present, `protected` only
/// for script extensions.
fn extension(name: String, publisher: &str, ext_type: &str, version: &str, protected: Option<Value>) -> Value {
  let mut properties = json!({
    "autoUpgradeMinorVersion": true,
    "publisher": publisher,
    "settings": {},
    "type": ext_type,
    "typeHandlerVersion": version,
  });
  if let Some(protected) = protected {
    properties["protectedSettings"] = protected;
  }
  json!({ "name": name, "properties": properties })
}

fn managed_identity_extension(name: String) -> Value {
  let mut ext = extension(
    name,
    "Microsoft.ManagedIdentity",
    "ManagedIdentityExtensionForLinux",
    "1.0",
    None,
  );
  ext["properties"]["settings"] = json!({ "port": 50343 });
  ext
}

fn linux_script_extension(name: String, command: String) -> Value {
  extension(
    name,
    "Microsoft.Azure.Extensions",
    "CustomScript",
    "2.0",
    Some(json!({ "commandToExecute": command })),
  )
}

// ============================================================================
// Master
// ============================================================================

/// Scale set holding every master.
pub fn master_scale_set(ctx: &Context<'_>, master: &MasterProfile) -> ResourceNode {
  let prefix = expr::variable("masterVMNamePrefix");
  let vmss_name = format!("[concat({prefix}, 'vmss')]");

  let mut node = ResourceNode::new(ResourceKind::ScaleSet, vmss_name.clone())
    .located()
    .depends_on(network_dependency(ctx));
  if ctx.has_multiple_masters {
    node = node.depends_on(expr::var_expr("masterInternalLbName"));
  }
  if ctx.has_cosmos_etcd {
    node = node.depends_on(cosmos_dependency());
  }
  if ctx.has_master_load_balancer() {
    node = node.depends_on(expr::var_expr("masterLbID"));
  }

  node = node.with(
    "tags",
    node_tags(
      format!("[concat(parameters('generatorCode'), '-', {prefix}, 'vmss')]"),
      "master",
      "[parameters('nameSuffix')]",
    ),
  );
  if master.has_availability_zones() {
    node = node.with("zones", json!("[parameters('availabilityZones')]"));
  }
  if let Some(identity) = identity_block(ctx, true) {
    node = node.with("identity", identity);
  }
  node = node.with(
    "sku",
    json!({ "capacity": master.count, "name": "[parameters('masterVMSize')]", "tier": "Standard" }),
  );

  let subnet = id(&expr::var_expr("vnetSubnetIDMaster"));
  let mut ip_configs = Vec::new();
  for i in 1..=master.ip_address_count.max(1) {
    let mut properties = json!({ "subnet": subnet.clone() });
    if i == 1 {
      properties["primary"] = json!(true);
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
      properties["loadBalancerBackendAddressPools"] = json!(pools);
      if !ctx.is_private_cluster {
        properties["loadBalancerInboundNatPools"] = json!([id(&format!(
          "[concat(variables('masterLbID'),'/inboundNatPools/SSH-', {prefix}, 'natpools')]"
        ))]);
      }
    }
    ip_configs.push(json!({ "name": format!("ipconfig{i}"), "properties": properties }));
  }

  let mut nic = json!({ "ipConfigurations": ip_configs, "primary": true });
  if ctx.is_custom_vnet {
    nic["networkSecurityGroup"] = id(&expr::var_expr("nsgID"));
  }
  if ctx.model.linux.custom_nodes_dns.as_deref().is_some_and(|dns| !dns.is_empty()) {
    nic["dnsSettings"] = json!({ "dnsServers": ["[parameters('dnsServer')]"] });
  }
  if !ctx.is_azure_cni {
    nic["enableIPForwarding"] = json!(true);
  }

  let mut data_disks = Vec::new();
  if !master.has_custom_image() && !ctx.has_cosmos_etcd {
    data_disks.push(json!({
      "createOption": "Empty",
      "diskSizeGB": ctx.model.orchestrator.etcd_disk_size_gb,
      "lun": 0,
    }));
  }
  let image_reference = if master.has_custom_image() {
    id("[resourceId(parameters('osImageResourceGroup'), 'Microsoft.Compute/images', parameters('osImageName'))]")
  } else {
    json!({
      "offer": "[parameters('osImageOffer')]",
      "publisher": "[parameters('osImagePublisher')]",
      "sku": "[parameters('osImageSku')]",
      "version": "[parameters('osImageVersion')]",
    })
  };
  let mut os_disk = json!({ "caching": "ReadWrite", "createOption": "FromImage" });
  if let Some(size) = master.os_disk_size_gb {
    os_disk["diskSizeGB"] = json!(size);
  }

  let mut extensions = Vec::new();
  if ctx.use_managed_identity {
    extensions.push(managed_identity_extension(format!(
      "[concat({prefix}, 'vmss-ManagedIdentityExtension')]"
    )));
  }
  extensions.push(linux_script_extension(
    format!("[concat({prefix}, 'vmssCSE')]"),
    master_provision_command(ctx),
  ));
  if ctx.model.is_billing_enabled() {
    extensions.push(extension(
      format!("[concat({prefix}, 'vmss-computeAksLinuxBilling')]"),
      "Microsoft.AKS",
      "Compute.AKS-Engine.Linux.Billing",
      "1.0",
      None,
    ));
  }

  node.properties(json!({
    "overprovision": false,
    "upgradePolicy": { "mode": "Manual" },
    "virtualMachineProfile": {
      "extensionProfile": { "extensions": extensions },
      "networkProfile": {
        "networkInterfaceConfigurations": [{
          "name": format!("[concat({prefix}, 'netintconfig')]"),
          "properties": nic,
        }],
      },
      "osProfile": {
        "adminUsername": "[parameters('linuxAdminUsername')]",
        "computerNamePrefix": vmss_name,
        "customData": custom_data(&ctx.script(Script::MasterCustomData)),
        "linuxConfiguration": linux_configuration(ctx),
      },
      "storageProfile": {
        "dataDisks": data_disks,
        "imageReference": image_reference,
        "osDisk": os_disk,
      },
    },
  }))
}

// ============================================================================
// Agents
// ============================================================================

/// Managed data disks of a scale set pool, read-only cached.
fn scale_set_data_disks(pool: &AgentPoolProfile) -> Vec<Value> {
  let prefix = pool_var(&pool.name, PoolVar::VmNamePrefix).reference();
  pool
    .disk_sizes_gb
    .iter()
    .enumerate()
    .map(|(lun, size)| {
      let mut disk = json!({
        "caching": "ReadOnly",
        "createOption": "Empty",
        "diskSizeGB": size,
        "lun": lun,
      });
      if pool.is_storage_account() {
        disk["name"] = json!(format!("[concat({prefix}, copyIndex(),'-datadisk{lun}')]"));
      }
      disk
    })
    .collect()
}

/// Scale set of one agent pool.
pub fn agent_scale_set(ctx: &Context<'_>, pool: &AgentPoolProfile) -> ResourceNode {
  let name = pool.name.as_str();
  let prefix = pool_var(name, PoolVar::VmNamePrefix).reference();
  let windows = pool.is_windows();

  let mut node = ResourceNode::new(ResourceKind::ScaleSet, pool_var(name, PoolVar::VmNamePrefix).expr())
    .located()
    .depends_on(network_dependency(ctx));
  if ctx.has_agent_load_balancer() {
    node = node.depends_on(expr::var_expr("agentLbID"));
  }
  if windows && ctx.model.has_windows_custom_image() {
    node = node.depends_on(custom_image_name(name));
  }

  let name_suffix = if windows {
    "[variables('winResourceNamePrefix')]"
  } else {
    "[parameters('nameSuffix')]"
  };
  node = node.with(
    "tags",
    node_tags(
      format!("[concat(parameters('generatorCode'), '-', {prefix})]"),
      name,
      name_suffix,
    ),
  );
  if let Some(identity) = identity_block(ctx, true) {
    node = node.with("identity", identity);
  }
  node = node.with(
    "sku",
    json!({ "capacity": pool.count, "name": pool_var(name, PoolVar::VmSize).expr(), "tier": "Standard" }),
  );

  let subnet = id(&pool_var(name, PoolVar::VnetSubnetId).expr());
  let ip_configs: Vec<Value> = (1..=pool.ip_address_count.max(1))
    .map(|i| {
      let mut properties = json!({ "subnet": subnet.clone() });
      if i == 1 {
        properties["primary"] = json!(true);
        if ctx.has_agent_load_balancer() {
          properties["loadBalancerBackendAddressPools"] = json!([agent_backend_pool()]);
        }
      }
      json!({ "name": format!("ipconfig{i}"), "properties": properties })
    })
    .collect();
  let mut nic = json!({
    "enableAcceleratedNetworking": pool.accelerated_networking,
    "ipConfigurations": ip_configs,
    "primary": true,
  });
  if ctx.is_custom_vnet {
    nic["networkSecurityGroup"] = id(&expr::var_expr("nsgID"));
  }
  if !windows && ctx.model.linux.custom_nodes_dns.as_deref().is_some_and(|dns| !dns.is_empty()) {
    nic["dnsSettings"] = json!({ "dnsServers": ["[parameters('dnsServer')]"] });
  }
  if !ctx.is_azure_cni {
    nic["enableIPForwarding"] = json!(true);
  }

  let mut os_profile = json!({ "computerNamePrefix": pool_var(name, PoolVar::VmNamePrefix).expr() });
  let mut storage_profile = serde_json::Map::new();
  let mut extensions = Vec::new();
  if windows {
    let enable_updates = ctx.model.windows.as_ref().is_some_and(|w| w.enable_automatic_updates);
    os_profile["adminUsername"] = json!("[parameters('windowsAdminUsername')]");
    os_profile["adminPassword"] = json!("[parameters('windowsAdminPassword')]");
    os_profile["customData"] = json!(custom_data(&ctx.script(Script::WindowsAgentCustomData)));
    os_profile["windowsConfiguration"] = json!({ "enableAutomaticUpdates": enable_updates });
    storage_profile.insert("imageReference".into(), windows_image_reference(ctx, pool));
    if pool.has_disks() {
      storage_profile.insert("dataDisks".into(), json!(scale_set_data_disks(pool)));
    }
    extensions.push(extension(
      "vmssCSE".to_string(),
      "Microsoft.Compute",
      "CustomScriptExtension",
      "1.8",
      Some(json!({ "commandToExecute": windows_provision_command() })),
    ));
  } else {
    os_profile["adminUsername"] = json!("[parameters('linuxAdminUsername')]");
    os_profile["customData"] = json!(custom_data(&ctx.script(Script::AgentCustomData)));
    os_profile["linuxConfiguration"] = linux_configuration(ctx);
    storage_profile.insert("imageReference".into(), linux_image_reference(pool));
    if !pool.has_custom_image() {
      storage_profile.insert("dataDisks".into(), json!(scale_set_data_disks(pool)));
    }
    extensions.push(linux_script_extension(
      "vmssCSE".to_string(),
      agent_provision_command(ctx, pool),
    ));
  }
  let mut os_disk = json!({ "caching": "ReadWrite", "createOption": "FromImage" });
  if let Some(size) = pool.os_disk_size_gb {
    os_disk["diskSizeGB"] = json!(size);
  }
  storage_profile.insert("osDisk".into(), os_disk);

  if ctx.model.is_billing_enabled() {
    let billing_type = if windows {
      "Compute.AKS-Engine.Windows.Billing"
    } else {
      "Compute.AKS-Engine.Linux.Billing"
    };
    extensions.push(extension(
      format!("[concat({prefix}, '-computeAksLinuxBilling')]"),
      "Microsoft.AKS",
      billing_type,
      "1.0",
      None,
    ));
  }

  let mut vm_profile = json!({
    "extensionProfile": { "extensions": extensions },
    "networkProfile": {
      "networkInterfaceConfigurations": [{
        "name": pool_var(name, PoolVar::VmNamePrefix).expr(),
        "properties": nic,
      }],
    },
    "osProfile": os_profile,
    "storageProfile": storage_profile,
  });
  if pool.is_low_priority_or_spot() {
    vm_profile["priority"] = json!(pool_var(name, PoolVar::ScaleSetPriority).expr());
    vm_profile["evictionPolicy"] = json!(pool_var(name, PoolVar::ScaleSetEvictionPolicy).expr());
  }

  node.properties(json!({
    "overprovision": false,
    "singlePlacementGroup": true,
    "upgradePolicy": { "mode": "Manual" },
    "virtualMachineProfile": vm_profile,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ClusterModel, OsType, ScaleSetPriority, VmSetType, WindowsProfile};
  use crate::scripts::BuiltinScripts;

  fn model(extra: &str) -> ClusterModel {
    let mut m = ClusterModel::from_json(&format!(
      r#"{{ "clusterId": "1", "orchestrator": {{ "version": "1.18.8" }},
           "master": {{ "count": 3, "dnsPrefix": "c", "vmSetType": "ScaleSet" }},
           "agentPools": [{{ "name": "pool1", "vmSize": "Standard_D2_v3", "diskSizesGB": [128] }}]
           {extra} }}"#
    ))
    .unwrap();
    m.agent_pools[0].vm_set_type = VmSetType::ScaleSet;
    m
  }

  fn extension_names(node: &ResourceNode) -> Vec<String> {
    node.fields["properties"]["virtualMachineProfile"]["extensionProfile"]["extensions"]
      .as_array()
      .unwrap()
      .iter()
      .map(|e| e["name"].as_str().unwrap().to_string())
      .collect()
  }

  // ==========================================================================
  // Master scale set
  // ==========================================================================

  #[test]
  fn master_scale_set_joins_both_load_balancers() {
    let m = model("");
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let vmss = master_scale_set(&ctx, m.master.as_ref().unwrap());
    assert_eq!(vmss.name, "[concat(variables('masterVMNamePrefix'), 'vmss')]");
    assert_eq!(vmss.fields["sku"]["capacity"], 3);
    assert!(vmss.depends_on.contains(&"[variables('masterInternalLbName')]".to_string()));
    assert!(vmss.depends_on.contains(&"[variables('masterLbID')]".to_string()));

    let nic = &vmss.fields["properties"]["virtualMachineProfile"]["networkProfile"]["networkInterfaceConfigurations"][0];
    let primary = &nic["properties"]["ipConfigurations"][0]["properties"];
    assert_eq!(primary["loadBalancerBackendAddressPools"].as_array().unwrap().len(), 2);
    assert!(primary["loadBalancerInboundNatPools"][0]["id"].as_str().unwrap().contains("natpools"));
  }

  #[test]
  fn master_extensions_follow_identity_and_billing() {
    let m = model(r#", "identity": { "useManagedIdentity": true }"#);
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let vmss = master_scale_set(&ctx, m.master.as_ref().unwrap());
    assert_eq!(
      extension_names(&vmss),
      vec![
        "[concat(variables('masterVMNamePrefix'), 'vmss-ManagedIdentityExtension')]",
        "[concat(variables('masterVMNamePrefix'), 'vmssCSE')]",
        "[concat(variables('masterVMNamePrefix'), 'vmss-computeAksLinuxBilling')]",
      ]
    );
  }

  #[test]
  fn master_etcd_disk_absent_with_cosmos() {
    let mut m = model("");
    m.orchestrator.etcd_disk_size_gb = 256;
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let vmss = master_scale_set(&ctx, m.master.as_ref().unwrap());
    let disks = &vmss.fields["properties"]["virtualMachineProfile"]["storageProfile"]["dataDisks"];
    assert_eq!(disks[0]["diskSizeGB"], 256);

    m.master.as_mut().unwrap().cosmos_etcd = true;
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let vmss = master_scale_set(&ctx, m.master.as_ref().unwrap());
    assert_eq!(
      vmss.fields["properties"]["virtualMachineProfile"]["storageProfile"]["dataDisks"],
      json!([])
    );
    assert!(vmss.depends_on.contains(&cosmos_dependency()));
  }

  // ==========================================================================
  // Agent scale sets
  // ==========================================================================

  #[test]
  fn linux_agent_scale_set_shape() {
    let m = model("");
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let vmss = agent_scale_set(&ctx, &m.agent_pools[0]);
    assert_eq!(vmss.name, "[variables('pool1VMNamePrefix')]");
    assert_eq!(vmss.depends_on, vec!["[variables('vnetID')]"]);
    assert_eq!(vmss.fields["sku"]["name"], "[variables('pool1VMSize')]");
    let profile = &vmss.fields["properties"]["virtualMachineProfile"];
    assert_eq!(profile["storageProfile"]["dataDisks"][0]["caching"], "ReadOnly");
    assert!(profile.get("priority").is_none());
    assert_eq!(
      extension_names(&vmss),
      vec!["vmssCSE", "[concat(variables('pool1VMNamePrefix'), '-computeAksLinuxBilling')]"]
    );
  }

  #[test]
  fn spot_pools_carry_priority_variables() {
    let mut m = model("");
    m.agent_pools[0].priority = ScaleSetPriority::Spot;
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let profile = agent_scale_set(&ctx, &m.agent_pools[0]).fields["properties"]["virtualMachineProfile"].clone();
    assert_eq!(profile["priority"], "[variables('pool1ScaleSetPriority')]");
    assert_eq!(profile["evictionPolicy"], "[variables('pool1ScaleSetEvictionPolicy')]");
  }

  #[test]
  fn windows_scale_set_uses_custom_script_extension() {
    let mut m = model("");
    m.agent_pools[0].os_type = OsType::Windows;
    m.windows = Some(WindowsProfile {
      image_source_url: Some("https://example/image.vhd".into()),
      ..WindowsProfile::default()
    });
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    let vmss = agent_scale_set(&ctx, &m.agent_pools[0]);
    assert!(vmss.depends_on.contains(&"pool1CustomWindowsImage".to_string()));
    let profile = &vmss.fields["properties"]["virtualMachineProfile"];
    let cse = &profile["extensionProfile"]["extensions"][0]["properties"];
    assert_eq!(cse["type"], "CustomScriptExtension");
    assert_eq!(cse["typeHandlerVersion"], "1.8");
    assert_eq!(
      profile["extensionProfile"]["extensions"][1]["properties"]["type"],
      "Compute.AKS-Engine.Windows.Billing"
    );
    assert!(profile["osProfile"].get("windowsConfiguration").is_some());
  }
}
