mod generate;
mod graph;
mod variables;

pub use generate::cmd_generate;
pub use graph::cmd_graph;
pub use variables::cmd_variables;
