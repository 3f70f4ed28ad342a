use crate::managers::vm_descriptor::RamUnit;

const MB_STEP: u64 = 256;
const MB_IN_GB: u64 = 1024;

/// Selectable RAM amounts in `unit` that fit into `total_mb` of host memory.
pub fn derive_ram_options(unit: RamUnit, total_mb: u64) -> Vec<u64> {
    match unit {
        RamUnit::Mb => (1..=total_mb / MB_STEP).map(|step| step * MB_STEP).collect(),
        RamUnit::Gb => (1..=total_mb / MB_IN_GB).collect(),
    }
}

pub fn total_in_unit(unit: RamUnit, total_mb: u64) -> u64 {
    match unit {
        RamUnit::Mb => total_mb,
        RamUnit::Gb => total_mb / MB_IN_GB,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamCheck {
    pub effective: u64,
    pub clamped: bool,
    pub warning: Option<String>,
}

/// Clamps `requested` to `total` and warns from 80% of `total` upward.
/// Both values are in the same unit; a `total` of 0 means unknown and
/// disables both.
pub fn warn_if_near_capacity(requested: u64, total: u64) -> RamCheck {
    if total == 0 {
        return RamCheck {
            effective: requested,
            clamped: false,
            warning: None,
        };
    }
    let effective = requested.min(total);
    let threshold = total * 4 / 5;
    let warning = (effective >= threshold).then(|| {
        format!(
            "{} of {} is at least 80% of host memory; the host may start swapping",
            effective, total
        )
    });
    RamCheck {
        effective,
        clamped: effective != requested,
        warning,
    }
}
