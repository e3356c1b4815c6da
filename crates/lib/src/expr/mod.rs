//! Template expression construction and inspection.
//!
//! Resources and variables carry strings in the bracket-call syntax of the
//! deployment engine: a string wrapped in `[` and `]` is evaluated, anything
//! else is a literal. This module builds such strings and takes them apart
//! again for reference checking and dependency resolution. It never
//! evaluates them.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::expr;
//!
//! assert_eq!(expr::var_expr("vnetID"), "[variables('vnetID')]");
//! assert_eq!(
//!   expr::concat(&[&expr::parameter("orchestratorName"), &expr::literal("-vnet-")]),
//!   "[concat(parameters('orchestratorName'), '-vnet-')]"
//! );
//! ```

mod call;
mod scan;

pub use call::{Call, normalize, parse_call, split_args, strip_brackets, unquote};
pub use scan::*;

use crate::helpers::escape_single_quotes;

/// `variables('name')`, for use inside a larger expression.
pub fn variable(name: &str) -> String {
  format!("variables('{name}')")
}

/// `parameters('name')`, for use inside a larger expression.
pub fn parameter(name: &str) -> String {
  format!("parameters('{name}')")
}

/// Wrap an inner call so the engine evaluates it.
pub fn expression(inner: &str) -> String {
  format!("[{inner}]")
}

/// `[variables('name')]`
pub fn var_expr(name: &str) -> String {
  expression(&variable(name))
}

/// `[parameters('name')]`
pub fn param_expr(name: &str) -> String {
  expression(&parameter(name))
}

/// A single-quoted string literal for use inside an expression.
pub fn literal(text: &str) -> String {
  format!("'{}'", escape_single_quotes(text))
}

/// `[concat(a, b, ...)]` over already-rendered arguments.
pub fn concat(args: &[&str]) -> String {
  expression(&format!("concat({})", args.join(", ")))
}

/// `[resourceId('Type', a, ...)]` over already-rendered name arguments.
pub fn resource_id(arm_type: &str, args: &[&str]) -> String {
  let mut rendered = vec![literal(arm_type)];
  rendered.extend(args.iter().map(|arg| (*arg).to_string()));
  expression(&format!("resourceId({})", rendered.join(", ")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_simple_references() {
    assert_eq!(variable("a"), "variables('a')");
    assert_eq!(param_expr("nameSuffix"), "[parameters('nameSuffix')]");
  }

  #[test]
  fn literal_escapes_quotes() {
    assert_eq!(literal("it's"), "'it''s'");
  }

  #[test]
  fn resource_id_quotes_type() {
    assert_eq!(
      resource_id("Microsoft.Network/virtualNetworks", &[&variable("virtualNetworkName")]),
      "[resourceId('Microsoft.Network/virtualNetworks', variables('virtualNetworkName'))]"
    );
  }

  #[test]
  fn built_expressions_scan_cleanly() {
    let built = concat(&[&variable("masterVMNamePrefix"), &literal("nic-")]);
    assert!(is_expression(&built));
    assert_eq!(variable_references(&built).unwrap(), vec!["masterVMNamePrefix"]);
  }
}
