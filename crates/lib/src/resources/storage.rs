//! Storage accounts for unmanaged disks, the KMS key vault account, and the
//! Cosmos account backing etcd.

use serde_json::json;

use super::{ResourceKind, ResourceNode, dependency};
use crate::context::Context;
use crate::expr;
use crate::helpers::STANDARD_LRS;
use crate::model::AgentPoolProfile;
use crate::names::{PoolVar, pool_var};

fn master_public_ip_dependency() -> String {
  dependency(ResourceKind::PublicIpAddress, &[&expr::variable("masterPublicIPAddressName")])
}

/// Account holding the master OS and etcd VHDs.
pub fn master_storage_account(ctx: &Context<'_>) -> ResourceNode {
  let node = ResourceNode::new(ResourceKind::StorageAccount, expr::var_expr("masterStorageAccountName"))
    .located()
    .with(
      "sku",
      json!({ "name": "[variables('vmSizesMap')[parameters('masterVMSize')].storageAccountType]" }),
    );
  if ctx.is_private_cluster {
    node
  } else {
    node.depends_on(master_public_ip_dependency())
  }
}

pub fn jumpbox_storage_account() -> ResourceNode {
  ResourceNode::new(ResourceKind::StorageAccount, expr::var_expr("jumpboxStorageAccountName"))
    .located()
    .with(
      "sku",
      json!({ "name": "[variables('vmSizesMap')[parameters('jumpboxVMSize')].storageAccountType]" }),
    )
}

/// Account paired with the KMS key vault; it shares the vault's name.
pub fn key_vault_storage_account() -> ResourceNode {
  ResourceNode::new(ResourceKind::StorageAccount, expr::var_expr("clusterKeyVaultName"))
    .located()
    .with("sku", json!({ "name": STANDARD_LRS }))
}

/// Name of the `copyIndex`-th sharded account of a pool.
///
/// The shard prefix is picked from the 36-character alphabet by
/// `(index + offset) mod 36` and `(index + offset) div 36`, so pools with
/// different offsets never collide.
pub(crate) fn agent_storage_account_name(pool: &str, index: &str, account: PoolVar) -> String {
  let offset = pool_var(pool, PoolVar::StorageAccountOffset).reference();
  let account = pool_var(pool, account).reference();
  format!(
    "[concat(variables('storageAccountPrefixes')[mod(add({index},{offset}),variables('storageAccountPrefixesCount'))],variables('storageAccountPrefixes')[div(add({index},{offset}),variables('storageAccountPrefixesCount'))],{account})]"
  )
}

/// Sharded OS disk (or, with `data_disks`, data disk) accounts of a pool.
pub fn agent_storage_accounts(ctx: &Context<'_>, pool: &AgentPoolProfile, data_disks: bool) -> ResourceNode {
  let name = pool.name.as_str();
  let (loop_name, index, account) = if data_disks {
    (
      "datadiskLoop",
      "copyIndex(variables('dataStorageAccountPrefixSeed'))",
      PoolVar::DataAccountName,
    )
  } else {
    ("loop", "copyIndex()", PoolVar::AccountName)
  };

  let node = ResourceNode::new(
    ResourceKind::StorageAccount,
    agent_storage_account_name(name, index, account),
  )
  .located()
  .copy(loop_name, pool_var(name, PoolVar::StorageAccountsCount).expr())
  .with(
    "sku",
    json!({
      "name": format!(
        "[variables('vmSizesMap')[{}].storageAccountType]",
        pool_var(name, PoolVar::VmSize).reference()
      ),
    }),
  );
  if !ctx.is_hosted_master && !ctx.is_private_cluster {
    node.depends_on(master_public_ip_dependency())
  } else {
    node
  }
}

// ============================================================================
// Cosmos etcd
// ============================================================================

/// How master resources wait on the Cosmos account.
pub(crate) fn cosmos_dependency() -> String {
  expr::resource_id(
    &format!("{}/", ResourceKind::CosmosAccount.arm_type()),
    &[&expr::variable("cosmosAccountName")],
  )
}

/// Cosmos account exposing an etcd-compatible API to the masters.
pub fn cosmos_account() -> ResourceNode {
  let consistency = json!({
    "defaultConsistencyLevel": "BoundedStaleness",
    "maxIntervalInSeconds": 5,
    "maxStalenessPrefix": 100,
  });
  let region = "[resourceGroup().location]";
  ResourceNode::new(ResourceKind::CosmosAccount, expr::var_expr("cosmosAccountName"))
    .at(region)
    .with("kind", json!("GlobalDocumentDB"))
    .with("tags", json!({ "defaultExperience": "Etcd" }))
    .with("primaryClientCertificatePemBytes", json!(expr::var_expr("cosmosDBCertb64")))
    .properties(json!({
      "capabilities": [{ "name": "EnableEtcd" }],
      "consistencyPolicy": consistency,
      "databaseAccountOfferType": "Standard",
      "locations": [
        { "failoverPriority": 0, "locationName": region },
        { "failoverPriority": 1, "locationName": region },
      ],
    }))
}
