pub mod config_directory;
pub mod fs_repository;
