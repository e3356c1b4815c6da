//! Per-generation context.
//!
//! The deriver and every builder branch on the same handful of cluster
//! properties. [`Context::new`] validates the model once, hoists those
//! properties into plain flags, and carries the script provider, so the
//! rest of the crate reads `ctx.is_custom_vnet` instead of re-walking the
//! model.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::GenerateError;
use crate::model::{AgentPoolProfile, ClusterModel, MasterProfile};
use crate::scripts::{Script, ScriptProvider};

/// Validated model plus hoisted conditions.
pub struct Context<'a> {
  pub model: &'a ClusterModel,
  scripts: &'a dyn ScriptProvider,

  pub is_hosted_master: bool,
  pub is_master_scale_set: bool,
  /// Any master, pool or jumpbox disk lives in a storage account.
  pub has_storage_account_disks: bool,
  pub is_azure_cni: bool,
  pub is_custom_vnet: bool,
  pub is_private_cluster: bool,
  pub provision_jumpbox: bool,
  pub use_managed_identity: bool,
  pub user_assigned_identity_enabled: bool,
  pub has_multiple_masters: bool,
  pub has_windows_pool: bool,
  pub is_custom_cloud: bool,
  pub is_azure_stack: bool,
  pub is_ipv6_dual_stack: bool,
  pub is_standard_load_balancer: bool,
  pub kms_enabled: bool,
  pub has_cosmos_etcd: bool,
  pub block_outbound_internet: bool,
  pub require_route_table: bool,
}

impl<'a> Context<'a> {
  /// Validate the model and hoist its conditions.
  ///
  /// # Errors
  ///
  /// - `MissingMasterProfile` when neither control plane profile is present
  /// - `UnsupportedMasterCount` when a self-hosted master count is not 1, 3 or 5
  /// - `DuplicatePoolName` when two agent pools share a name
  pub fn new(model: &'a ClusterModel, scripts: &'a dyn ScriptProvider) -> Result<Self, GenerateError> {
    let master = match (&model.master, &model.hosted_master) {
      (Some(master), _) => Some(master),
      (None, Some(_)) => None,
      (None, None) => return Err(GenerateError::MissingMasterProfile),
    };

    if let Some(master) = master
      && !matches!(master.count, 1 | 3 | 5)
    {
      return Err(GenerateError::UnsupportedMasterCount(master.count));
    }

    let mut seen = BTreeSet::new();
    for pool in &model.agent_pools {
      if !seen.insert(pool.name.as_str()) {
        return Err(GenerateError::DuplicatePoolName(pool.name.clone()));
      }
    }

    let jumpbox = model.jumpbox();
    let has_storage_account_disks = master.is_some_and(MasterProfile::is_storage_account)
      || model.agent_pools.iter().any(AgentPoolProfile::is_storage_account)
      || jumpbox.is_some_and(|j| j.storage_backend == crate::model::StorageBackend::StorageAccount);

    let ctx = Self {
      model,
      scripts,
      is_hosted_master: master.is_none(),
      is_master_scale_set: master.is_some_and(MasterProfile::is_scale_set),
      has_storage_account_disks,
      is_azure_cni: model.is_azure_cni(),
      is_custom_vnet: model.is_custom_vnet(),
      is_private_cluster: model.is_private_cluster(),
      provision_jumpbox: jumpbox.is_some(),
      use_managed_identity: model.identity.use_managed_identity,
      user_assigned_identity_enabled: model.identity.user_assigned_enabled(),
      has_multiple_masters: master.is_some_and(MasterProfile::has_multiple_nodes),
      has_windows_pool: model.has_windows(),
      is_custom_cloud: model.is_custom_cloud(),
      is_azure_stack: model.is_azure_stack(),
      is_ipv6_dual_stack: model.feature_flags.enable_ipv6_dual_stack,
      is_standard_load_balancer: model.is_standard_load_balancer(),
      kms_enabled: model.orchestrator.enable_encryption_with_external_kms,
      has_cosmos_etcd: master.is_some_and(|m| m.cosmos_etcd),
      block_outbound_internet: model.feature_flags.block_outbound_internet,
      require_route_table: model.require_route_table(),
    };

    debug!(
      hosted = ctx.is_hosted_master,
      scale_set_master = ctx.is_master_scale_set,
      custom_vnet = ctx.is_custom_vnet,
      private = ctx.is_private_cluster,
      pools = model.agent_pools.len(),
      "generation context ready"
    );

    Ok(ctx)
  }

  /// The self-hosted master profile.
  ///
  /// Callers only reach for this on self-hosted branches, so a missing
  /// profile is reported as the programming error it is.
  pub fn self_hosted_master(&self) -> Result<&'a MasterProfile, GenerateError> {
    self.model.master.as_ref().ok_or(GenerateError::MissingMasterProfile)
  }

  /// The master profile when the control plane is self-hosted.
  pub fn master(&self) -> Option<&'a MasterProfile> {
    self.model.master.as_ref()
  }

  pub fn pools(&self) -> &'a [AgentPoolProfile] {
    &self.model.agent_pools
  }

  /// Lowercased DNS prefix of the control plane.
  pub fn dns_prefix(&self) -> String {
    self.model.dns_prefix().to_lowercase()
  }

  pub fn script(&self, script: Script) -> String {
    self.scripts.script(script)
  }

  /// User-assigned identity grants replace per-VM system grants.
  pub fn system_assigned_identity(&self) -> bool {
    self.use_managed_identity && !self.user_assigned_identity_enabled
  }

  /// A self-hosted control plane fronted by the public master load balancer.
  ///
  /// A private cluster on a basic SKU reaches the internet through NIC
  /// outbound rules or the internal LB and gets none, except when the
  /// masters are a scale set. Private scale-set masters still get the LB,
  /// but it carries only the outbound rule: no balancing rules, probes or
  /// SSH NAT pool.
  pub fn has_master_load_balancer(&self) -> bool {
    let basic_private = self.is_private_cluster && !self.is_standard_load_balancer;
    !self.is_hosted_master && (!basic_private || self.is_master_scale_set)
  }

  /// Agents share a standard outbound load balancer.
  pub fn has_agent_load_balancer(&self) -> bool {
    !self.is_hosted_master && self.is_standard_load_balancer && !self.pools().is_empty()
  }

  /// Master count of a self-hosted cluster, zero when hosted.
  pub fn master_count(&self) -> u32 {
    self.master().map_or(0, |m| m.count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scripts::BuiltinScripts;

  fn model(json: &str) -> ClusterModel {
    ClusterModel::from_json(json).unwrap()
  }

  #[test]
  fn rejects_missing_control_plane() {
    let m = model(r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" } }"#);
    assert!(matches!(
      Context::new(&m, &BuiltinScripts),
      Err(GenerateError::MissingMasterProfile)
    ));
  }

  #[test]
  fn rejects_even_master_counts() {
    let m = model(r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" }, "master": { "count": 2, "dnsPrefix": "x" } }"#);
    assert!(matches!(
      Context::new(&m, &BuiltinScripts),
      Err(GenerateError::UnsupportedMasterCount(2))
    ));
  }

  #[test]
  fn rejects_duplicate_pool_names() {
    let m = model(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" }, "master": { "count": 1, "dnsPrefix": "x" },
           "agentPools": [{ "name": "a", "vmSize": "Standard_D2_v3" }, { "name": "a", "vmSize": "Standard_D2_v3" }] }"#,
    );
    assert!(matches!(
      Context::new(&m, &BuiltinScripts),
      Err(GenerateError::DuplicatePoolName(name)) if name == "a"
    ));
  }

  #[test]
  fn hoists_flags() {
    let m = model(
      r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" },
           "master": { "count": 3, "dnsPrefix": "MyCluster", "vmSetType": "ScaleSet" },
           "agentPools": [{ "name": "a", "vmSize": "Standard_D2_v3", "storageBackend": "StorageAccount" }],
           "identity": { "useManagedIdentity": true } }"#,
    );
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    assert!(!ctx.is_hosted_master);
    assert!(ctx.is_master_scale_set);
    assert!(ctx.has_multiple_masters);
    assert!(ctx.has_storage_account_disks);
    assert!(ctx.system_assigned_identity());
    assert_eq!(ctx.dns_prefix(), "mycluster");
    assert_eq!(ctx.master_count(), 3);
  }

  #[test]
  fn hosted_master_skips_count_validation() {
    let m = model(r#"{ "clusterId": "1", "orchestrator": { "version": "1.18.8" }, "hostedMaster": { "dnsPrefix": "h" } }"#);
    let ctx = Context::new(&m, &BuiltinScripts).unwrap();
    assert!(ctx.is_hosted_master);
    assert!(ctx.self_hosted_master().is_err());
  }
}
