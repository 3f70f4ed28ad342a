use std::path::PathBuf;

use log::warn;

use crate::managers::vm_descriptor::{DiskEntry, DiskType};

const ENTRY_SEPARATOR: char = DiskEntry::LIST_SEPARATOR;
const FIELD_SEPARATOR: char = ':';

/// Parses `TYPE:PATH:CAPACITY`.
///
/// The type ends at the first colon and the capacity starts after the last
/// one, so drive letters inside the path (`E:\VM\disk.qcow2`) survive.
/// Returns `None` for an entry without any colon.
pub fn parse_disk_entry(entry: &str) -> Option<DiskEntry> {
    let (tag, rest) = entry.split_once(FIELD_SEPARATOR)?;
    let (path, capacity) = rest.rsplit_once(FIELD_SEPARATOR).unwrap_or((rest, ""));
    Some(DiskEntry {
        disk_type: DiskType::from_tag(tag),
        path: (!path.is_empty()).then(|| PathBuf::from(path)),
        capacity_mb: capacity.to_string(),
    })
}

pub fn parse_disk_list(list: &str) -> Vec<DiskEntry> {
    list.split(ENTRY_SEPARATOR)
        .filter_map(parse_disk_entry)
        .collect()
}

/// `None` when the entry has no path yet or its path can't be stored.
/// A capacity that isn't plain decimal is written empty.
pub fn format_disk_entry(entry: &DiskEntry) -> Option<String> {
    let path = entry.path.as_deref()?;
    if path.as_os_str().is_empty() {
        return None;
    }
    if !DiskEntry::is_storable_path(path) {
        warn!("Dropping disk {:?}: the path can't be stored", path);
        return None;
    }
    let capacity = match DiskEntry::is_decimal_capacity(&entry.capacity_mb) {
        true => entry.capacity_mb.as_str(),
        false => "",
    };
    Some(format!(
        "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
        entry.disk_type.tag(),
        path.to_string_lossy(),
        capacity
    ))
}

pub fn format_disk_list(entries: &[DiskEntry]) -> String {
    entries
        .iter()
        .filter_map(format_disk_entry)
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string())
}
