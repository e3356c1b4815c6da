//! kubearm-lib: deployment template generation for Kubernetes clusters
//!
//! This crate turns a validated cluster model into the two halves of a
//! resource-manager deployment template:
//! - `variables`: the flat variable map every expression reads from
//! - `resources`: the resource declarations, in emission order
//!
//! Generation is pure and deterministic. Script bodies come from a
//! [`ScriptProvider`](scripts::ScriptProvider); everything else is derived
//! from the model.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::{ClusterModel, generate};
//! use kubearm_lib::scripts::BuiltinScripts;
//!
//! let model = ClusterModel::from_json(r#"{
//!   "clusterId": "12345678",
//!   "orchestrator": { "version": "1.18.8" },
//!   "master": { "count": 1, "dnsPrefix": "mycluster" },
//!   "agentPools": [{ "name": "agentpool1", "vmSize": "Standard_D2_v3" }]
//! }"#).unwrap();
//!
//! let document = generate(&model, &BuiltinScripts).unwrap().to_arm_json();
//! assert_eq!(document["contentVersion"], "1.0.0.0");
//! ```

pub mod assembler;
pub mod context;
pub mod error;
pub mod expr;
pub mod graph;
pub mod helpers;
pub mod model;
pub mod names;
pub mod resources;
pub mod scripts;
pub mod template;
pub mod variables;

pub use assembler::generate;
pub use error::GenerateError;
pub use model::ClusterModel;
pub use template::Template;
pub use variables::{VariableMap, derive_variables};
