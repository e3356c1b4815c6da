//! Per-pool variables, namespaced by pool name.

use super::VariableMap;
use crate::context::Context;
use crate::model::AgentPoolProfile;
use crate::names::{PoolVar, agent_vm_prefix, pool_var};

pub(super) fn derive(ctx: &Context<'_>) -> VariableMap {
  let mut vars = VariableMap::new();
  for (index, pool) in ctx.pools().iter().enumerate() {
    derive_pool(ctx, index, pool, &mut vars);
  }
  vars
}

fn derive_pool(ctx: &Context<'_>, index: usize, pool: &AgentPoolProfile, vars: &mut VariableMap) {
  let name = pool.name.as_str();
  let var = |v: PoolVar| pool_var(name, v).to_string();
  let param = |v: PoolVar| pool_var(name, v).param_expr();

  vars.insert(var(PoolVar::Index), index);
  vars.insert(var(PoolVar::Count), param(PoolVar::Count));
  vars.insert(var(PoolVar::VmNamePrefix), agent_vm_prefix(&ctx.model.cluster_id, pool, index));
  vars.insert(var(PoolVar::VmSize), param(PoolVar::VmSize));

  if pool.is_storage_account() {
    let count = pool_var(name, PoolVar::Count).reference();
    vars.insert(
      var(PoolVar::StorageAccountOffset),
      format!(
        "[mul(variables('maxStorageAccountsPerAgent'),{})]",
        pool_var(name, PoolVar::Index).reference()
      ),
    );
    vars.insert(
      var(PoolVar::StorageAccountsCount),
      format!(
        "[add(div({count}, variables('maxVMsPerStorageAccount')), mod(add(mod({count}, variables('maxVMsPerStorageAccount')),2), add(mod({count}, variables('maxVMsPerStorageAccount')),1)))]"
      ),
    );
    vars.insert(
      var(PoolVar::AccountName),
      format!("[concat(variables('storageAccountBaseName'), 'agnt{index}')]"),
    );
    if pool.has_disks() {
      vars.insert(
        var(PoolVar::DataAccountName),
        format!("[concat(variables('storageAccountBaseName'), 'data{index}')]"),
      );
    }
  }

  if pool.is_availability_set() {
    vars.insert(var(PoolVar::Offset), param(PoolVar::Offset));
    vars.insert(
      var(PoolVar::AvailabilitySet),
      format!("[concat('{name}-availabilitySet-', parameters('nameSuffix'))]"),
    );
  } else if pool.is_low_priority_or_spot() {
    vars.insert(var(PoolVar::ScaleSetPriority), param(PoolVar::ScaleSetPriority));
    vars.insert(var(PoolVar::ScaleSetEvictionPolicy), param(PoolVar::ScaleSetEvictionPolicy));
  }

  // ==========================================================================
  // Subnet
  // ==========================================================================

  if pool.is_custom_vnet() {
    let subnet_param = pool_var(name, PoolVar::VnetSubnetId).parameter();
    vars.insert(var(PoolVar::VnetSubnetId), format!("[{subnet_param}]"));
    vars.insert(var(PoolVar::SubnetName), format!("[{subnet_param}]"));
    vars.insert(var(PoolVar::VnetParts), format!("[split({subnet_param},'/subnets/')]"));
  } else {
    vars.insert(var(PoolVar::VnetSubnetId), "[variables('vnetSubnetID')]");
    vars.insert(var(PoolVar::SubnetName), "[variables('subnetName')]");
  }
  let subnet = pool_var(name, PoolVar::VnetSubnetId).reference();
  vars.insert(var(PoolVar::SubnetResourceGroup), format!("[split({subnet}, '/')[4]]"));
  vars.insert(var(PoolVar::Vnet), format!("[split({subnet}, '/')[8]]"));

  // ==========================================================================
  // OS image
  // ==========================================================================

  for image_var in [
    PoolVar::OsImageOffer,
    PoolVar::OsImageSku,
    PoolVar::OsImagePublisher,
    PoolVar::OsImageVersion,
    PoolVar::OsImageName,
    PoolVar::OsImageResourceGroup,
  ] {
    vars.insert(var(image_var), param(image_var));
  }
}
