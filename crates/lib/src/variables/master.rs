//! Self-hosted control plane variables.
//!
//! Availability-set masters get five-slot name and address arrays whatever
//! their count; the copy loops index into them by `masterOffset`. The etcd
//! peer certificate arrays are sized to the real count.

use serde_json::json;

use super::VariableMap;
use crate::context::Context;
use crate::error::GenerateError;
use crate::names::ORCHESTRATOR_NAME;

/// Slots in the fixed master arrays.
pub(crate) const MASTER_SLOTS: usize = 5;

pub(crate) const INTERNAL_LB_STATIC_IP_OFFSET: u32 = 10;
pub(crate) const ETCD_SERVER_PORT: u32 = 2380;
pub(crate) const ETCD_CLIENT_PORT: u32 = 2379;
const ETCD_METRICS_PORT: u32 = 2480;

const CERT_DIR: &str = "/etc/kubernetes/certs";

fn slots(render: impl Fn(usize) -> String) -> Vec<String> {
  (0..MASTER_SLOTS).map(render).collect()
}

/// `masterVMNames[i]=masterEtcdPeerURLs[i]` pairs for the first `members` masters.
fn cluster_state(members: usize) -> String {
  let pairs: Vec<String> = (0..members)
    .map(|i| format!("variables('masterVMNames')[{i}], '=', variables('masterEtcdPeerURLs')[{i}]"))
    .collect();
  format!("[concat({})]", pairs.join(", ',', "))
}

pub(super) fn derive(ctx: &Context<'_>) -> Result<VariableMap, GenerateError> {
  let mut vars = VariableMap::new();
  if ctx.is_hosted_master {
    return Ok(vars);
  }
  let master = ctx.self_hosted_master()?;
  let count = master.count as usize;

  vars.insert("masterCount", master.count);
  vars.insert("masterAvailabilitySet", "[concat('master-availabilityset-', parameters('nameSuffix'))]");
  if ctx.is_master_scale_set {
    vars.insert("masterOffset", "");
    vars.insert("masterIpAddressCount", master.ip_address_count);
  } else {
    vars.insert("masterOffset", "[parameters('masterOffset')]");
  }
  if master.is_storage_account() {
    vars.insert("masterStorageAccountName", "[concat(variables('storageAccountBaseName'), 'mstr0')]");
  }

  // ==========================================================================
  // etcd certificates
  // ==========================================================================

  let keys: Vec<String> = (0..count)
    .map(|i| format!("[parameters('etcdPeerPrivateKey{i}')]"))
    .collect();
  let certs: Vec<String> = (0..count)
    .map(|i| format!("[parameters('etcdPeerCertificate{i}')]"))
    .collect();
  vars.insert("etcdPeerPrivateKeys", json!(keys));
  vars.insert("etcdPeerCertificates", json!(certs));
  vars.insert("etcdPeerCertFilepath", json!(slots(|i| format!("{CERT_DIR}/etcdpeer{i}.crt"))));
  vars.insert("etcdPeerKeyFilepath", json!(slots(|i| format!("{CERT_DIR}/etcdpeer{i}.key"))));
  vars.insert("etcdCaFilepath", format!("{CERT_DIR}/ca.crt"));
  vars.insert("etcdClientCertFilepath", format!("{CERT_DIR}/etcdclient.crt"));
  vars.insert("etcdClientKeyFilepath", format!("{CERT_DIR}/etcdclient.key"));
  vars.insert("etcdServerCertFilepath", format!("{CERT_DIR}/etcdserver.crt"));
  vars.insert("etcdServerKeyFilepath", format!("{CERT_DIR}/etcdserver.key"));
  vars.insert("masterEtcdServerPort", ETCD_SERVER_PORT);
  vars.insert("masterEtcdClientPort", ETCD_CLIENT_PORT);

  // ==========================================================================
  // Addressing
  // ==========================================================================

  vars.insert(
    "masterFirstAddrComment",
    "these MasterFirstAddrComment are used to place multiple masters consecutively in the address space",
  );
  vars.insert("masterFirstAddrOctets", "[split(parameters('firstConsecutiveStaticIP'),'.')]");
  vars.insert("masterFirstAddrOctet4", "[variables('masterFirstAddrOctets')[3]]");
  vars.insert(
    "masterFirstAddrPrefix",
    "[concat(variables('masterFirstAddrOctets')[0],'.',variables('masterFirstAddrOctets')[1],'.',variables('masterFirstAddrOctets')[2],'.')]",
  );

  if ctx.is_master_scale_set {
    vars.insert(
      "masterVMNamePrefix",
      "[concat(parameters('orchestratorName'), '-master-', parameters('nameSuffix'), '-')]",
    );
  } else {
    vars.insert(
      "masterVMNamePrefix",
      format!("{ORCHESTRATOR_NAME}-master-{}-", ctx.model.cluster_id),
    );
    vars.insert(
      "masterVMNames",
      json!(slots(|i| format!("[concat(variables('masterVMNamePrefix'), '{i}')]"))),
    );
    vars.insert(
      "masterPrivateIpAddrs",
      json!(slots(|i| format!(
        "[concat(variables('masterFirstAddrPrefix'), add({i}, int(variables('masterFirstAddrOctet4'))))]"
      ))),
    );
    vars.insert(
      "masterEtcdPeerURLs",
      json!(slots(|i| format!(
        "[concat('https://', variables('masterPrivateIpAddrs')[{i}], ':', variables('masterEtcdServerPort'))]"
      ))),
    );
    vars.insert(
      "masterEtcdClientURLs",
      json!(slots(|i| format!(
        "[concat('https://', variables('masterPrivateIpAddrs')[{i}], ':', variables('masterEtcdClientPort'))]"
      ))),
    );
    vars.insert(
      "masterEtcdMetricURLs",
      json!(slots(|i| format!(
        "[concat('http://', variables('masterPrivateIpAddrs')[{i}], ':{ETCD_METRICS_PORT}')]"
      ))),
    );
    vars.insert(
      "masterEtcdClusterStates",
      json!([cluster_state(1), cluster_state(3), cluster_state(5)]),
    );
  }

  // ==========================================================================
  // API server endpoint
  // ==========================================================================

  let api_server_ip = match (ctx.has_multiple_masters, ctx.is_master_scale_set) {
    (true, true) => {
      "[concat(variables('masterFirstAddrOctets')[0],'.',variables('masterFirstAddrOctets')[1],'.255.', variables('masterInternalLbIPOffset'))]"
    }
    (true, false) => {
      "[concat(variables('masterFirstAddrPrefix'), add(variables('masterInternalLbIPOffset'), int(variables('masterFirstAddrOctet4'))))]"
    }
    (false, _) => "[parameters('firstConsecutiveStaticIP')]",
  };
  vars.insert("kubernetesAPIServerIP", api_server_ip);

  if ctx.has_multiple_masters {
    vars.insert(
      "masterInternalLbName",
      "[concat(parameters('orchestratorName'), '-master-internal-lb-', parameters('nameSuffix'))]",
    );
    vars.insert(
      "masterInternalLbID",
      "[resourceId('Microsoft.Network/loadBalancers',variables('masterInternalLbName'))]",
    );
    vars.insert(
      "masterInternalLbIPConfigName",
      "[concat(parameters('orchestratorName'), '-master-internal-lbFrontEnd-', parameters('nameSuffix'))]",
    );
    vars.insert(
      "masterInternalLbIPConfigID",
      "[concat(variables('masterInternalLbID'),'/frontendIPConfigurations/', variables('masterInternalLbIPConfigName'))]",
    );
    vars.insert("masterInternalLbIPOffset", INTERNAL_LB_STATIC_IP_OFFSET);
  }

  if ctx.is_private_cluster {
    vars.insert(
      "kubeconfigServer",
      "[concat('https://', variables('kubernetesAPIServerIP'), ':443')]",
    );
  } else {
    vars.insert(
      "kubeconfigServer",
      "[concat('https://', variables('masterFqdnPrefix'), '.', variables('location'), '.', parameters('fqdnEndpointSuffix'))]",
    );
  }

  // ==========================================================================
  // Jumpbox
  // ==========================================================================

  if let Some(jumpbox) = ctx.model.jumpbox() {
    vars.insert("jumpboxOSDiskName", "[concat(parameters('jumpboxVMName'), '-osdisk')]");
    vars.insert("jumpboxPublicIpAddressName", "[concat(parameters('jumpboxVMName'), '-ip')]");
    vars.insert("jumpboxNetworkInterfaceName", "[concat(parameters('jumpboxVMName'), '-nic')]");
    vars.insert("jumpboxNetworkSecurityGroupName", "[concat(parameters('jumpboxVMName'), '-nsg')]");
    if jumpbox.storage_backend == crate::model::StorageBackend::StorageAccount {
      vars.insert("jumpboxStorageAccountName", "[concat(variables('storageAccountBaseName'), 'jb')]");
    }
  }

  Ok(vars)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ClusterModel, VmSetType};
  use crate::scripts::BuiltinScripts;

  fn model(count: u32) -> ClusterModel {
    ClusterModel::from_json(&format!(
      r#"{{ "clusterId": "12345678", "orchestrator": {{ "version": "1.18.8" }},
           "master": {{ "count": {count}, "dnsPrefix": "c" }} }}"#
    ))
    .unwrap()
  }

  fn derived(m: &ClusterModel) -> VariableMap {
    derive(&Context::new(m, &BuiltinScripts).unwrap()).unwrap()
  }

  // ==========================================================================
  // etcd sizing
  // ==========================================================================

  #[test]
  fn peer_arrays_match_count() {
    for count in [1u32, 3, 5] {
      let vars = derived(&model(count));
      let keys = vars.get("etcdPeerPrivateKeys").unwrap().as_array().unwrap();
      let certs = vars.get("etcdPeerCertificates").unwrap().as_array().unwrap();
      assert_eq!(keys.len(), count as usize);
      assert_eq!(certs.len(), count as usize);
      assert_eq!(
        certs.last().unwrap(),
        &json!(format!("[parameters('etcdPeerCertificate{}')]", count - 1))
      );
    }
  }

  #[test]
  fn master_arrays_always_have_five_slots() {
    let vars = derived(&model(1));
    for key in [
      "masterVMNames",
      "masterPrivateIpAddrs",
      "masterEtcdPeerURLs",
      "masterEtcdClientURLs",
      "masterEtcdMetricURLs",
      "etcdPeerCertFilepath",
    ] {
      assert_eq!(vars.get(key).unwrap().as_array().unwrap().len(), MASTER_SLOTS, "{key}");
    }
  }

  #[test]
  fn cluster_states_cover_one_three_five() {
    let vars = derived(&model(3));
    let states = vars.get("masterEtcdClusterStates").unwrap().as_array().unwrap();
    assert_eq!(states.len(), 3);
    assert_eq!(
      states[0],
      json!("[concat(variables('masterVMNames')[0], '=', variables('masterEtcdPeerURLs')[0])]")
    );
    assert!(states[2].as_str().unwrap().contains("variables('masterEtcdPeerURLs')[4]"));
  }

  // ==========================================================================
  // Internal load balancer
  // ==========================================================================

  #[test]
  fn single_master_uses_first_static_ip() {
    let vars = derived(&model(1));
    assert_eq!(
      vars.get_str("kubernetesAPIServerIP"),
      Some("[parameters('firstConsecutiveStaticIP')]")
    );
    assert!(!vars.contains("masterInternalLbName"));
  }

  #[test]
  fn multiple_masters_offset_api_server_ip() {
    let vars = derived(&model(3));
    assert!(vars.contains("masterInternalLbName"));
    assert_eq!(vars.get("masterInternalLbIPOffset"), Some(&json!(10)));
    assert!(vars.get_str("kubernetesAPIServerIP").unwrap().contains("masterInternalLbIPOffset"));

    let mut m = model(3);
    m.master.as_mut().unwrap().vm_set_type = VmSetType::ScaleSet;
    let vars = derived(&m);
    assert!(vars.get_str("kubernetesAPIServerIP").unwrap().contains("'.255.'"));
    assert!(!vars.contains("masterVMNames"));
    assert_eq!(vars.get_str("masterOffset"), Some(""));
  }
}
