//! Flat `key=value` text form of a [`VmDescriptor`].
//!
//! Decoding is total: lines that can't be interpreted are collected in
//! [`ParsedDescriptor::ignored`] instead of failing the whole read.

use std::borrow::Cow;

use crate::managers::vm_descriptor::{Accelerator, VmDescriptor};

pub mod disk_list;
pub mod gpu_options;

const NAME_KEY: &str = "name";
const CPU_MODEL_KEY: &str = "cpuModel";
const CPU_CORES_KEY: &str = "cpuCores";
const CPU_SOCKETS_KEY: &str = "cpuSockets";
const CPU_THREADS_KEY: &str = "cpuThreads";
const CPU_FEATURES_KEY: &str = "cpuFeatures";
const CPU_ACCEL_KEY: &str = "cpuAccel";
const CPU_ACCELERATOR_KEY: &str = "cpuAccelerator";
const RAM_KEY: &str = "ram";
const DISK_KEY: &str = "disk";
const GPU_KEY: &str = "gpu";
const NETWORK_KEY: &str = "network";
const HARDWARE_KEY: &str = "hw";

const KEY_VALUE_SEPARATOR: char = '=';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingSeparator,
    UnknownKey,
    InvalidValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredLine {
    pub number: usize,
    pub content: String,
    pub reason: IgnoreReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDescriptor {
    pub descriptor: VmDescriptor,
    pub ignored: Vec<IgnoredLine>,
}

impl ParsedDescriptor {
    pub fn has_name(&self) -> bool {
        !self.descriptor.name.is_empty()
    }
}

pub fn serialize(descriptor: &VmDescriptor) -> String {
    let cpu = &descriptor.cpu;
    let mut text = String::new();
    push_line(&mut text, NAME_KEY, &descriptor.name);
    push_optional(&mut text, CPU_MODEL_KEY, cpu.model.as_deref());
    push_optional(&mut text, CPU_CORES_KEY, cpu.cores.as_deref());
    push_optional(&mut text, CPU_SOCKETS_KEY, cpu.sockets.as_deref());
    push_optional(&mut text, CPU_THREADS_KEY, cpu.threads.as_deref());
    push_optional(&mut text, CPU_FEATURES_KEY, cpu.features.as_deref());
    push_optional(
        &mut text,
        CPU_ACCEL_KEY,
        cpu.accel_enabled
            .map(|enabled| if enabled { "true" } else { "false" }),
    );
    push_optional(
        &mut text,
        CPU_ACCELERATOR_KEY,
        cpu.accelerator.as_ref().map(Accelerator::as_str),
    );
    push_optional(&mut text, RAM_KEY, descriptor.ram.as_deref());
    push_line(
        &mut text,
        DISK_KEY,
        &disk_list::format_disk_list(&descriptor.disks),
    );
    push_optional(
        &mut text,
        GPU_KEY,
        Some(gpu_options::encode(&descriptor.gpu).as_str()),
    );
    push_optional(&mut text, NETWORK_KEY, descriptor.network.as_deref());
    push_optional(&mut text, HARDWARE_KEY, descriptor.hardware.as_deref());
    text
}

pub fn deserialize(text: &str) -> ParsedDescriptor {
    let mut parsed = ParsedDescriptor::default();
    for (index, raw_line) in text.split('\n').enumerate() {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.trim().is_empty() {
            continue;
        }
        let result = match line.split_once(KEY_VALUE_SEPARATOR) {
            Some((key, value)) => apply_field(&mut parsed.descriptor, key.trim(), value),
            None => Err(IgnoreReason::MissingSeparator),
        };
        if let Err(reason) = result {
            parsed.ignored.push(IgnoredLine {
                number: index + 1,
                content: line.to_string(),
                reason,
            });
        }
    }
    parsed
}

fn apply_field(descriptor: &mut VmDescriptor, key: &str, value: &str) -> Result<(), IgnoreReason> {
    let cpu = &mut descriptor.cpu;
    match key {
        NAME_KEY => descriptor.name = value.to_string(),
        CPU_MODEL_KEY => cpu.model = non_empty(value),
        CPU_CORES_KEY => cpu.cores = non_empty(value),
        CPU_SOCKETS_KEY => cpu.sockets = non_empty(value),
        CPU_THREADS_KEY => cpu.threads = non_empty(value),
        CPU_FEATURES_KEY => cpu.features = non_empty(value),
        CPU_ACCEL_KEY => {
            cpu.accel_enabled = parse_optional(value)?;
        }
        CPU_ACCELERATOR_KEY => {
            cpu.accelerator = parse_optional(value)?;
        }
        RAM_KEY => descriptor.ram = non_empty(value),
        DISK_KEY => descriptor.disks = disk_list::parse_disk_list(value),
        GPU_KEY => descriptor.gpu = gpu_options::decode(value),
        NETWORK_KEY => descriptor.network = non_empty(value),
        HARDWARE_KEY => descriptor.hardware = non_empty(value),
        _ => return Err(IgnoreReason::UnknownKey),
    }
    Ok(())
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_optional<T: std::str::FromStr>(value: &str) -> Result<Option<T>, IgnoreReason> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| IgnoreReason::InvalidValue)
}

fn push_optional(text: &mut String, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        push_line(text, key, value);
    }
}

fn push_line(text: &mut String, key: &str, value: &str) {
    text.push_str(key);
    text.push(KEY_VALUE_SEPARATOR);
    text.push_str(&single_line(value));
    text.push('\n');
}

fn single_line(value: &str) -> Cow<'_, str> {
    const LINE_BREAKS: &[char] = &['\n', '\r'];
    if value.contains(LINE_BREAKS) {
        Cow::Owned(value.replace("\r\n", " ").replace(LINE_BREAKS, " "))
    } else {
        Cow::Borrowed(value)
    }
}
