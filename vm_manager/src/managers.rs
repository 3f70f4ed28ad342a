pub mod descriptor_editor;
pub mod memory_sizing;
pub mod vm_config_manager;
pub mod vm_descriptor;
