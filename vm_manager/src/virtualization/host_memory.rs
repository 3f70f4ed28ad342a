use sysinfo::System;

const BYTES_IN_MB: u64 = 1024 * 1024;

pub trait HostMemory {
    /// Total physical memory in MB, 0 when it can't be determined.
    fn total_physical_memory_mb(&self) -> u64;
}

#[derive(Default)]
pub struct SysinfoHostMemory;

impl HostMemory for SysinfoHostMemory {
    fn total_physical_memory_mb(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.total_memory() / BYTES_IN_MB
    }
}
