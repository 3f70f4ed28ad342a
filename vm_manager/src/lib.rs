mod utils;

pub mod config;
pub mod managers;
pub mod storage;
pub mod virtualization;
