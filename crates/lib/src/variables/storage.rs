//! Storage account sharding for unmanaged disks.

use serde_json::{Value, json};

use super::VariableMap;
use crate::context::Context;
use crate::helpers::vm_sizes_map;

/// First characters of sharded storage account names.
pub(crate) const STORAGE_ACCOUNT_PREFIXES: [&str; 36] = [
  "0", "6", "c", "i", "o", "u", "1", "7", "d", "j", "p", "v", "2", "8", "e", "k", "q", "w", "3", "9", "f", "l",
  "r", "x", "4", "a", "g", "m", "s", "y", "5", "b", "h", "n", "t", "z",
];

pub(crate) const MAX_VMS_PER_STORAGE_ACCOUNT: u32 = 20;
pub(crate) const DATA_STORAGE_ACCOUNT_PREFIX_SEED: u32 = 97;

pub(super) fn derive(ctx: &Context<'_>) -> VariableMap {
  let mut vars = VariableMap::new();

  if ctx.has_storage_account_disks {
    vars.insert("maxVMsPerStorageAccount", MAX_VMS_PER_STORAGE_ACCOUNT);
    vars.insert(
      "maxStorageAccountsPerAgent",
      "[div(variables('maxVMsPerPool'),variables('maxVMsPerStorageAccount'))]",
    );
    vars.insert("dataStorageAccountPrefixSeed", DATA_STORAGE_ACCOUNT_PREFIX_SEED);
    vars.insert("storageAccountPrefixes", json!(STORAGE_ACCOUNT_PREFIXES.as_slice()));
    vars.insert("storageAccountPrefixesCount", "[length(variables('storageAccountPrefixes'))]");
    vars.insert("vmsPerStorageAccount", MAX_VMS_PER_STORAGE_ACCOUNT);
    vars.insert(
      "storageAccountBaseName",
      "[uniqueString(concat(variables('masterFqdnPrefix'),variables('location')))]",
    );
  } else {
    vars.insert("storageAccountPrefixes", Value::Array(Vec::new()));
    vars.insert("storageAccountBaseName", "");
  }

  // The jumpbox looks up its disk class in the size map even on managed disks.
  if ctx.has_storage_account_disks || ctx.provision_jumpbox {
    vars.insert("vmSizesMap", vm_sizes_map());
  }

  vars
}
