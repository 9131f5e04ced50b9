//! Built-in tool implementations for GearLoop.
//!
//! These give the agent its hands: read/write files, list directories,
//! run shell commands, and discover/activate skills. Everything else is
//! expected to be registered by the embedding application.

pub mod file_read;
pub mod file_write;
pub mod list_files;
pub mod shell;
pub mod skills;

use std::sync::Arc;

use gearloop_core::Registry;

pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use list_files::ListFilesTool;
pub use shell::BashTool;
pub use skills::{ListSkillsTool, ReadSkillTool, UseSkillTool};

/// Create a registry with all built-in tools registered.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.must_register(Arc::new(ReadFileTool));
    registry.must_register(Arc::new(WriteFileTool));
    registry.must_register(Arc::new(ListFilesTool));
    registry.must_register(Arc::new(BashTool));
    registry.must_register(Arc::new(ListSkillsTool));
    registry.must_register(Arc::new(ReadSkillTool));
    registry.must_register(Arc::new(UseSkillTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_builtins_sorted() {
        let registry = default_registry();
        let names: Vec<String> = registry
            .list()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "bash",
                "list_files",
                "list_skills",
                "read_file",
                "read_skill",
                "use_skill",
                "write_file",
            ]
        );
    }
}
