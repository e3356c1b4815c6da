//! VM extensions of availability-set machines: the provisioning script and
//! the billing marker.

use serde_json::json;

use super::{
  ResourceKind, ResourceNode, agent_provision_command, copy_index, dependency, master_provision_command,
  windows_provision_command,
};
use crate::context::Context;
use crate::expr;
use crate::model::AgentPoolProfile;
use crate::names::{PoolVar, pool_var};

/// Names and loop of one availability set's VMs.
struct VmLoop {
  prefix: String,
  offset: String,
  count: String,
}

impl VmLoop {
  fn master() -> Self {
    Self {
      prefix: expr::variable("masterVMNamePrefix"),
      offset: copy_index("masterOffset"),
      count: "[sub(variables('masterCount'), variables('masterOffset'))]".to_string(),
    }
  }

  fn pool(pool: &AgentPoolProfile) -> Self {
    let name = pool.name.as_str();
    Self {
      prefix: pool_var(name, PoolVar::VmNamePrefix).reference(),
      offset: copy_index(&pool_var(name, PoolVar::Offset).to_string()),
      count: format!(
        "[sub({}, {})]",
        pool_var(name, PoolVar::Count).reference(),
        pool_var(name, PoolVar::Offset).reference()
      ),
    }
  }

  fn extension(&self, name: String) -> ResourceNode {
    ResourceNode::new(ResourceKind::Extension, name)
      .located()
      .copy("vmLoopNode", self.count.clone())
      .depends_on(dependency(ResourceKind::VirtualMachine, &[&self.prefix, &self.offset]))
  }
}

fn script_properties(publisher: &str, ext_type: &str, version: &str, command: String) -> serde_json::Value {
  json!({
    "autoUpgradeMinorVersion": true,
    "protectedSettings": { "commandToExecute": command },
    "publisher": publisher,
    "settings": {},
    "type": ext_type,
    "typeHandlerVersion": version,
  })
}

/// Provisioning script extension on every master.
pub fn master_custom_script(ctx: &Context<'_>) -> ResourceNode {
  let vms = VmLoop::master();
  let name = format!(
    "[concat({}, {},'/cse', '-master-', {})]",
    vms.prefix, vms.offset, vms.offset
  );
  vms
    .extension(name)
    .with("tags", json!({}))
    .properties(script_properties(
      "Microsoft.Azure.Extensions",
      "CustomScript",
      "2.0",
      master_provision_command(ctx),
    ))
}

/// Provisioning script extension on every VM of an agent pool.
pub fn agent_custom_script(ctx: &Context<'_>, pool: &AgentPoolProfile) -> ResourceNode {
  let vms = VmLoop::pool(pool);
  let name = format!(
    "[concat({}, {},'/cse', '-agent-', {})]",
    vms.prefix, vms.offset, vms.offset
  );
  let properties = if pool.is_windows() {
    script_properties(
      "Microsoft.Compute",
      "CustomScriptExtension",
      "1.8",
      windows_provision_command(),
    )
  } else {
    script_properties(
      "Microsoft.Azure.Extensions",
      "CustomScript",
      "2.0",
      agent_provision_command(ctx, pool),
    )
  };
  vms.extension(name).properties(properties)
}

fn billing_properties(ext_type: &str) -> serde_json::Value {
  json!({
    "autoUpgradeMinorVersion": true,
    "publisher": "Microsoft.AKS",
    "settings": {},
    "type": ext_type,
    "typeHandlerVersion": "1.0",
  })
}

/// Billing marker on every master.
pub fn master_billing() -> ResourceNode {
  let vms = VmLoop::master();
  let name = format!("[concat({}, {}, '/computeAksLinuxBilling')]", vms.prefix, vms.offset);
  vms
    .extension(name)
    .with("tags", json!({}))
    .properties(billing_properties("Compute.AKS-Engine.Linux.Billing"))
}

/// Billing marker on every VM of an agent pool; hosted clusters bill under
/// the managed service.
pub fn agent_billing(ctx: &Context<'_>, pool: &AgentPoolProfile) -> ResourceNode {
  let vms = VmLoop::pool(pool);
  let name = format!("[concat({}, {}, '/computeAksLinuxBilling')]", vms.prefix, vms.offset);
  let ext_type = match (ctx.is_hosted_master, pool.is_windows()) {
    (true, true) => "Compute.AKS.Windows.Billing",
    (true, false) => "Compute.AKS.Linux.Billing",
    (false, true) => "Compute.AKS-Engine.Windows.Billing",
    (false, false) => "Compute.AKS-Engine.Linux.Billing",
  };
  vms.extension(name).properties(billing_properties(ext_type))
}
