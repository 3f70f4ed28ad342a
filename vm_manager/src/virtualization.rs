pub mod host_memory;
pub mod image_tool;
pub mod qemu_img;
