//! Virtual machines, availability sets and the Windows custom image.
//!
//! Master and agent VMs are declared once with a copy loop; every name
//! inside them is a `copyIndex` expression offset by the set's offset
//! variable so a template can add machines to an existing set.

use serde_json::{Map, Value, json};

use super::storage::agent_storage_account_name;
use super::{ResourceKind, ResourceNode, copy_index, custom_data, dependency, identity_block, linux_configuration, node_tags};
use crate::context::Context;
use crate::expr;
use crate::model::{AgentPoolProfile, MasterProfile};
use crate::names::{PoolVar, custom_image_name, pool_var};
use crate::scripts::Script;

fn id(value: &str) -> Value {
  json!({ "id": value })
}

/// Image reference of a Windows pool: the image built from the supplied
/// VHD when there is one, the marketplace image otherwise.
pub(crate) fn windows_image_reference(ctx: &Context<'_>, pool: &AgentPoolProfile) -> Value {
  if ctx.model.has_windows_custom_image() {
    id(&expr::resource_id(
      ResourceKind::Image.arm_type(),
      &[&expr::literal(&custom_image_name(&pool.name))],
    ))
  } else {
    json!({
      "offer": "[parameters('agentWindowsOffer')]",
      "publisher": "[parameters('agentWindowsPublisher')]",
      "sku": "[parameters('agentWindowsSku')]",
      "version": "[parameters('agentWindowsVersion')]",
    })
  }
}

/// Image reference of a Linux pool.
pub(crate) fn linux_image_reference(pool: &AgentPoolProfile) -> Value {
  let name = pool.name.as_str();
  if pool.has_custom_image() {
    id(&format!(
      "[resourceId({}, 'Microsoft.Compute/images', {})]",
      pool_var(name, PoolVar::OsImageResourceGroup).reference(),
      pool_var(name, PoolVar::OsImageName).reference()
    ))
  } else {
    json!({
      "offer": pool_var(name, PoolVar::OsImageOffer).expr(),
      "publisher": pool_var(name, PoolVar::OsImagePublisher).expr(),
      "sku": pool_var(name, PoolVar::OsImageSku).expr(),
      "version": pool_var(name, PoolVar::OsImageVersion).expr(),
    })
  }
}

/// `reference(<account>).primaryEndpoints.blob`, the blob endpoint of an
/// account named by `account_args`.
fn blob_endpoint(account_args: &str) -> String {
  format!(
    "reference(concat('Microsoft.Storage/storageAccounts/',{account_args}),variables('apiVersionStorage')).primaryEndpoints.blob"
  )
}

// ============================================================================
// Master
// ============================================================================

/// Availability-set masters.
pub fn master_vm(ctx: &Context<'_>, master: &MasterProfile) -> ResourceNode {
  let offset = copy_index("masterOffset");
  let prefix = expr::variable("masterVMNamePrefix");
  let vm_name = expr::concat(&[&prefix, &offset]);
  let zones = master.has_availability_zones();
  let storage_account = master.is_storage_account();

  let mut node = ResourceNode::new(ResourceKind::VirtualMachine, vm_name.clone())
    .located()
    .copy("vmLoopNode", "[sub(variables('masterCount'), variables('masterOffset'))]")
    .depends_on(dependency(ResourceKind::NetworkInterface, &[&prefix, "'nic-'", &offset]));
  if !zones {
    node = node.depends_on(dependency(
      ResourceKind::AvailabilitySet,
      &[&expr::variable("masterAvailabilitySet")],
    ));
  }
  if storage_account {
    node = node.depends_on(expr::var_expr("masterStorageAccountName"));
  }

  node = node.with(
    "tags",
    node_tags(
      format!("[concat(parameters('generatorCode'), '-', {prefix}, {offset})]"),
      "master",
      "[parameters('nameSuffix')]",
    ),
  );
  if zones {
    node = node.with(
      "zones",
      json!([format!(
        "[string(parameters('availabilityZones')[mod({offset}, length(parameters('availabilityZones')))])]"
      )]),
    );
  }
  if let Some(identity) = identity_block(ctx, true) {
    node = node.with("identity", identity);
  }

  let master_account = expr::variable("masterStorageAccountName");
  let mut data_disks = Vec::new();
  if !ctx.has_cosmos_etcd {
    let mut disk = json!({
      "createOption": "Empty",
      "diskSizeGB": ctx.model.orchestrator.etcd_disk_size_gb,
      "lun": 0,
      "name": format!("[concat({prefix}, {offset},'-etcddisk')]"),
    });
    if storage_account {
      disk["vhd"] = json!({
        "uri": format!(
          "[concat({},'vhds/', {prefix},{offset},'-etcddisk.vhd')]",
          blob_endpoint(&master_account)
        ),
      });
    }
    data_disks.push(disk);
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

  let mut os_disk = json!({ "createOption": "FromImage" });
  if storage_account {
    os_disk["name"] = json!(format!("[concat({prefix}, {offset},'-osdisk')]"));
    os_disk["vhd"] = json!({
      "uri": format!(
        "[concat({},'vhds/',{prefix},{offset},'-osdisk.vhd')]",
        blob_endpoint(&master_account)
      ),
    });
  }
  if let Some(size) = master.os_disk_size_gb {
    os_disk["diskSizeGB"] = json!(size);
  }

  let mut properties = json!({
    "hardwareProfile": { "vmSize": "[parameters('masterVMSize')]" },
    "networkProfile": {
      "networkInterfaces": [id(&format!(
        "[resourceId('Microsoft.Network/networkInterfaces',concat({prefix},'nic-', {offset}))]"
      ))],
    },
    "osProfile": {
      "adminUsername": "[parameters('linuxAdminUsername')]",
      "computerName": vm_name,
      "customData": custom_data(&ctx.script(Script::MasterCustomData)),
      "linuxConfiguration": linux_configuration(ctx),
    },
    "storageProfile": {
      "dataDisks": data_disks,
      "imageReference": image_reference,
      "osDisk": os_disk,
    },
  });
  if !zones {
    properties["availabilitySet"] = id("[resourceId('Microsoft.Compute/availabilitySets',variables('masterAvailabilitySet'))]");
  }
  node.properties(properties)
}

/// Availability set of the masters. Zoned masters get a bare set.
pub fn master_availability_set(master: &MasterProfile) -> ResourceNode {
  let node = ResourceNode::new(ResourceKind::AvailabilitySet, expr::var_expr("masterAvailabilitySet")).located();
  match (master.has_availability_zones(), master.is_managed_disks()) {
    (true, _) => node,
    (false, true) => node
      .with("sku", json!({ "name": "Aligned" }))
      .properties(json!({ "platformFaultDomainCount": 2, "platformUpdateDomainCount": 3 })),
    (false, false) => node.properties(json!({})),
  }
}

// ============================================================================
// Jumpbox
// ============================================================================

/// Jumpbox VM of a private cluster, on a stock Ubuntu image.
pub fn jumpbox_vm(ctx: &Context<'_>) -> ResourceNode {
  let managed = ctx
    .model
    .jumpbox()
    .is_some_and(|j| j.storage_backend == crate::model::StorageBackend::ManagedDisks);
  let os_disk = if managed {
    let mut disk = json!({
      "createOption": "FromImage",
      "managedDisk": {
        "storageAccountType": "[variables('vmSizesMap')[parameters('jumpboxVMSize')].storageAccountType]",
      },
    });
    if let Some(size) = ctx.model.jumpbox().and_then(|j| j.os_disk_size_gb) {
      disk["diskSizeGB"] = json!(size);
    }
    disk
  } else {
    json!({
      "createOption": "FromImage",
      "name": "[variables('jumpboxOSDiskName')]",
      "vhd": {
        "uri": format!(
          "[concat({},'vhds/',parameters('jumpboxVMName'),'jumpboxdisk.vhd')]",
          blob_endpoint(&expr::variable("jumpboxStorageAccountName"))
        ),
      },
    })
  };

  ResourceNode::new(ResourceKind::VirtualMachine, "[parameters('jumpboxVMName')]")
    .located()
    .depends_on(dependency(
      ResourceKind::NetworkInterface,
      &[&expr::variable("jumpboxNetworkInterfaceName")],
    ))
    .properties(json!({
      "hardwareProfile": { "vmSize": "[parameters('jumpboxVMSize')]" },
      "networkProfile": {
        "networkInterfaces": [id(&expr::resource_id(
          ResourceKind::NetworkInterface.arm_type(),
          &[&expr::variable("jumpboxNetworkInterfaceName")],
        ))],
      },
      "osProfile": {
        "adminUsername": "[parameters('jumpboxUsername')]",
        "computerName": "[parameters('jumpboxVMName')]",
        "customData": custom_data(&ctx.script(Script::JumpboxCustomData)),
        "linuxConfiguration": {
          "disablePasswordAuthentication": true,
          "ssh": {
            "publicKeys": [{
              "keyData": "[parameters('jumpboxPublicKey')]",
              "path": "[concat('/home/', parameters('jumpboxUsername'), '/.ssh/authorized_keys')]",
            }],
          },
        },
      },
      "storageProfile": {
        "dataDisks": [],
        "imageReference": {
          "offer": "UbuntuServer",
          "publisher": "Canonical",
          "sku": "16.04-LTS",
          "version": "latest",
        },
        "osDisk": os_disk,
      },
    }))
}

// ============================================================================
// Agents
// ============================================================================

/// Concat arguments naming the sharded account that holds the disk of VM
/// `vm_index`; data disks are offset by the data prefix seed.
fn vm_storage_account_args(pool: &str, vm_index: &str, data: bool) -> String {
  let mut index = format!("div({vm_index},variables('maxVMsPerStorageAccount'))");
  if data {
    index = format!("add({index},variables('dataStorageAccountPrefixSeed'))");
  }
  let account = if data { PoolVar::DataAccountName } else { PoolVar::AccountName };
  let name = agent_storage_account_name(pool, &index, account);
  name
    .strip_prefix("[concat(")
    .and_then(|rest| rest.strip_suffix(")]"))
    .unwrap_or(&name)
    .to_string()
}

fn agent_data_disks(pool: &AgentPoolProfile) -> Vec<Value> {
  let name = pool.name.as_str();
  let prefix = pool_var(name, PoolVar::VmNamePrefix).reference();
  pool
    .disk_sizes_gb
    .iter()
    .enumerate()
    .map(|(lun, size)| {
      let mut disk = json!({ "createOption": "Empty", "diskSizeGB": size, "lun": lun });
      if pool.is_storage_account() {
        disk["name"] = json!(format!("[concat({prefix}, copyIndex(),'-datadisk{lun}')]"));
        disk["vhd"] = json!({
          "uri": format!(
            "[concat('http://',{},'.blob.core.windows.net/vhds/',{prefix},copyIndex(), '--datadisk{lun}.vhd')]",
            vm_storage_account_args(name, "copyIndex()", true)
          ),
        });
      }
      disk
    })
    .collect()
}

/// VMs of an availability-set agent pool.
pub fn agent_vm(ctx: &Context<'_>, pool: &AgentPoolProfile) -> ResourceNode {
  let name = pool.name.as_str();
  let offset = copy_index(&pool_var(name, PoolVar::Offset).to_string());
  let prefix = pool_var(name, PoolVar::VmNamePrefix).reference();
  let vm_name = expr::concat(&[&prefix, &offset]);

  let mut node = ResourceNode::new(ResourceKind::VirtualMachine, vm_name.clone())
    .located()
    .copy(
      "vmLoopNode",
      format!(
        "[sub({}, {})]",
        pool_var(name, PoolVar::Count).reference(),
        pool_var(name, PoolVar::Offset).reference()
      ),
    );
  if pool.is_storage_account() {
    node = node.depends_on(dependency(
      ResourceKind::StorageAccount,
      &[&vm_storage_account_args(name, &offset, false)],
    ));
    if pool.has_disks() {
      node = node.depends_on(dependency(
        ResourceKind::StorageAccount,
        &[&vm_storage_account_args(name, &offset, true)],
      ));
    }
  }
  node = node
    .depends_on(dependency(ResourceKind::NetworkInterface, &[&prefix, "'nic-'", &offset]))
    .depends_on(dependency(
      ResourceKind::AvailabilitySet,
      &[&pool_var(name, PoolVar::AvailabilitySet).reference()],
    ));
  if pool.is_windows() && ctx.model.has_windows_custom_image() {
    node = node.depends_on(custom_image_name(name));
  }

  let name_suffix = if pool.is_windows() {
    "[variables('winResourceNamePrefix')]"
  } else {
    "[parameters('nameSuffix')]"
  };
  node = node.with(
    "tags",
    node_tags(
      format!("[concat(parameters('generatorCode'), '-', {prefix}, {offset})]"),
      name,
      name_suffix,
    ),
  );
  if let Some(identity) = identity_block(ctx, !pool.is_windows()) {
    node = node.with("identity", identity);
  }

  let mut os_profile = Map::new();
  os_profile.insert("computerName".into(), json!(vm_name));
  if pool.is_windows() {
    let enable_updates = ctx.model.windows.as_ref().is_some_and(|w| w.enable_automatic_updates);
    os_profile.insert("adminUsername".into(), json!("[parameters('windowsAdminUsername')]"));
    os_profile.insert("adminPassword".into(), json!("[parameters('windowsAdminPassword')]"));
    os_profile.insert(
      "customData".into(),
      json!(custom_data(&ctx.script(Script::WindowsAgentCustomData))),
    );
    os_profile.insert(
      "windowsConfiguration".into(),
      json!({ "enableAutomaticUpdates": enable_updates }),
    );
  } else {
    os_profile.insert("adminUsername".into(), json!("[parameters('linuxAdminUsername')]"));
    os_profile.insert("customData".into(), json!(custom_data(&ctx.script(Script::AgentCustomData))));
    os_profile.insert("linuxConfiguration".into(), linux_configuration(ctx));
  }

  let mut storage_profile = Map::new();
  let (image_reference, with_data_disks) = if pool.is_windows() {
    (windows_image_reference(ctx, pool), pool.has_disks())
  } else {
    (linux_image_reference(pool), !pool.has_custom_image())
  };
  storage_profile.insert("imageReference".into(), image_reference);
  if with_data_disks {
    storage_profile.insert("dataDisks".into(), json!(agent_data_disks(pool)));
  }

  let mut os_disk = json!({ "createOption": "FromImage" });
  if pool.is_storage_account() {
    os_disk["name"] = json!(format!("[concat({prefix}, {offset},'-osdisk')]"));
    os_disk["vhd"] = json!({
      "uri": format!(
        "[concat({},'osdisk/', {prefix}, {offset}, '-osdisk.vhd')]",
        blob_endpoint(&vm_storage_account_args(name, &offset, false))
      ),
    });
  }
  if let Some(size) = pool.os_disk_size_gb {
    os_disk["diskSizeGB"] = json!(size);
  }
  storage_profile.insert("osDisk".into(), os_disk);

  node.properties(json!({
    "availabilitySet": id(&format!(
      "[resourceId('Microsoft.Compute/availabilitySets',{})]",
      pool_var(name, PoolVar::AvailabilitySet).reference()
    )),
    "hardwareProfile": { "vmSize": pool_var(name, PoolVar::VmSize).expr() },
    "networkProfile": {
      "networkInterfaces": [id(&format!(
        "[resourceId('Microsoft.Network/networkInterfaces',concat({prefix}, 'nic-', {offset}))]"
      ))],
    },
    "osProfile": os_profile,
    "storageProfile": storage_profile,
  }))
}

/// Availability set of an agent pool.
pub fn agent_availability_set(pool: &AgentPoolProfile) -> ResourceNode {
  let node = ResourceNode::new(
    ResourceKind::AvailabilitySet,
    pool_var(&pool.name, PoolVar::AvailabilitySet).expr(),
  )
  .located();
  if pool.is_managed_disks() {
    node
      .with("sku", json!({ "name": "Aligned" }))
      .properties(json!({ "platformFaultDomainCount": 2, "platformUpdateDomainCount": 3 }))
  } else {
    node.properties(json!({}))
  }
}

/// Windows image built from the supplied VHD, named after its pool.
pub fn windows_image(pool: &AgentPoolProfile) -> ResourceNode {
  ResourceNode::new(ResourceKind::Image, custom_image_name(&pool.name))
    .located()
    .properties(json!({
      "hyperVGeneration": "V1",
      "storageProfile": {
        "osDisk": {
          "blobUri": "[parameters('agentWindowsSourceUrl')]",
          "osState": "Generalized",
          "osType": "Windows",
          "storageAccountType": crate::helpers::STANDARD_LRS,
        },
      },
    }))
}
