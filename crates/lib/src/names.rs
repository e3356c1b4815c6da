//! Typed names for pool-scoped variables.
//!
//! Every agent pool contributes a family of variables whose names are the
//! pool name followed by a fixed suffix (`agentpool1VMNamePrefix`,
//! `agentpool1Offset`, ...). Building those names through [`PoolVar`] keeps
//! the deriver and the builders from drifting apart on spelling.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::names::{PoolVar, pool_var};
//!
//! let prefix = pool_var("agentpool1", PoolVar::VmNamePrefix);
//! assert_eq!(prefix.to_string(), "agentpool1VMNamePrefix");
//! assert_eq!(prefix.reference(), "variables('agentpool1VMNamePrefix')");
//! ```

use std::fmt;

use crate::model::AgentPoolProfile;

/// Orchestrator short name used in literal resource names.
pub const ORCHESTRATOR_NAME: &str = "k8s";

/// Suffix of a pool-scoped variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolVar {
  Index,
  Count,
  Offset,
  VmNamePrefix,
  VmSize,
  AvailabilitySet,
  AvailabilityZones,
  StorageAccountOffset,
  StorageAccountsCount,
  AccountName,
  DataAccountName,
  VnetSubnetId,
  SubnetName,
  VnetParts,
  SubnetResourceGroup,
  Vnet,
  ScaleSetPriority,
  ScaleSetEvictionPolicy,
  OsImageOffer,
  OsImageSku,
  OsImagePublisher,
  OsImageVersion,
  OsImageName,
  OsImageResourceGroup,
}

impl PoolVar {
  pub fn suffix(self) -> &'static str {
    match self {
      PoolVar::Index => "Index",
      PoolVar::Count => "Count",
      PoolVar::Offset => "Offset",
      PoolVar::VmNamePrefix => "VMNamePrefix",
      PoolVar::VmSize => "VMSize",
      PoolVar::AvailabilitySet => "AvailabilitySet",
      PoolVar::AvailabilityZones => "AvailabilityZones",
      PoolVar::StorageAccountOffset => "StorageAccountOffset",
      PoolVar::StorageAccountsCount => "StorageAccountsCount",
      PoolVar::AccountName => "AccountName",
      PoolVar::DataAccountName => "DataAccountName",
      PoolVar::VnetSubnetId => "VnetSubnetID",
      PoolVar::SubnetName => "SubnetName",
      PoolVar::VnetParts => "VnetParts",
      PoolVar::SubnetResourceGroup => "SubnetResourceGroup",
      PoolVar::Vnet => "Vnet",
      PoolVar::ScaleSetPriority => "ScaleSetPriority",
      PoolVar::ScaleSetEvictionPolicy => "ScaleSetEvictionPolicy",
      PoolVar::OsImageOffer => "osImageOffer",
      PoolVar::OsImageSku => "osImageSKU",
      PoolVar::OsImagePublisher => "osImagePublisher",
      PoolVar::OsImageVersion => "osImageVersion",
      PoolVar::OsImageName => "osImageName",
      PoolVar::OsImageResourceGroup => "osImageResourceGroup",
    }
  }
}

/// A pool-scoped name: pool name plus suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolVarName<'a> {
  pool: &'a str,
  var: PoolVar,
}

/// Name the `var` variable of `pool`.
pub fn pool_var(pool: &str, var: PoolVar) -> PoolVarName<'_> {
  PoolVarName { pool, var }
}

impl PoolVarName<'_> {
  /// `variables('<name>')`
  pub fn reference(&self) -> String {
    crate::expr::variable(&self.to_string())
  }

  /// `[variables('<name>')]`
  pub fn expr(&self) -> String {
    crate::expr::var_expr(&self.to_string())
  }

  /// `parameters('<name>')`; pool parameters share the variable's name.
  pub fn parameter(&self) -> String {
    crate::expr::parameter(&self.to_string())
  }

  /// `[parameters('<name>')]`
  pub fn param_expr(&self) -> String {
    crate::expr::param_expr(&self.to_string())
  }
}

impl fmt::Display for PoolVarName<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.pool, self.var.suffix())
  }
}

/// Literal name of the Windows image built for a pool.
pub fn custom_image_name(pool: &str) -> String {
  format!("{pool}CustomWindowsImage")
}

/// Literal VM name prefix of the pool at `index`.
///
/// Windows computer names are capped at 15 characters, so Windows pools get
/// a short prefix built from the cluster id and the pool index.
pub fn agent_vm_prefix(cluster_id: &str, pool: &AgentPoolProfile, index: usize) -> String {
  if pool.is_windows() {
    let short: String = cluster_id.chars().take(4).collect();
    format!("{short}{ORCHESTRATOR_NAME}{index:02}")
  } else if pool.is_scale_set() {
    format!("{ORCHESTRATOR_NAME}-{}-{cluster_id}-vmss", pool.name)
  } else {
    format!("{ORCHESTRATOR_NAME}-{}-{cluster_id}-", pool.name)
  }
}

/// Literal prefix shared by cluster-wide network resources.
pub fn resource_prefix(cluster_id: &str, hosted: bool) -> String {
  if hosted {
    format!("{ORCHESTRATOR_NAME}-agentpool-{cluster_id}-")
  } else {
    format!("{ORCHESTRATOR_NAME}-master-{cluster_id}-")
  }
}
