use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum DescriptorValueError {
    #[error("Unknown accelerator: '{0}'")]
    UnknownAccelerator(String),
    #[error("Unknown disk type: '{0}'")]
    UnknownDiskType(String),
    #[error("Unknown RAM unit: '{0}'")]
    UnknownRamUnit(String),
    #[error("RAM size must be a decimal number followed by MB or GB, got: '{0}'")]
    InvalidRamSize(String),
}

/// Full named configuration record of one virtual machine.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct VmDescriptor {
    pub name: String,
    pub cpu: CpuConfig,
    pub ram: Option<String>,
    pub disks: Vec<DiskEntry>,
    pub gpu: GpuOptions,
    pub network: Option<String>,
    pub hardware: Option<String>,
}

impl VmDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// `None` when the RAM text is absent or isn't in the `<amount><MB|GB>` form.
    pub fn ram_size(&self) -> Option<RamSize> {
        self.ram.as_deref().and_then(|ram| ram.parse().ok())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct CpuConfig {
    pub model: Option<String>,
    pub cores: Option<String>,
    pub sockets: Option<String>,
    pub threads: Option<String>,
    pub features: Option<String>,
    pub accel_enabled: Option<bool>,
    pub accelerator: Option<Accelerator>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    Tcg,
    Kvm,
    Xen,
    Hvf,
    Whpx,
    Nvmm,
}

impl Accelerator {
    pub const ALL: [Accelerator; 6] = [
        Accelerator::Tcg,
        Accelerator::Kvm,
        Accelerator::Xen,
        Accelerator::Hvf,
        Accelerator::Whpx,
        Accelerator::Nvmm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Accelerator::Tcg => "TCG",
            Accelerator::Kvm => "KVM",
            Accelerator::Xen => "Xen",
            Accelerator::Hvf => "hvf",
            Accelerator::Whpx => "whpx",
            Accelerator::Nvmm => "nvmm",
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Accelerator {
    type Err = DescriptorValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Accelerator::ALL
            .into_iter()
            .find(|accelerator| accelerator.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| DescriptorValueError::UnknownAccelerator(value.to_string()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamUnit {
    Mb,
    Gb,
}

impl RamUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RamUnit::Mb => "MB",
            RamUnit::Gb => "GB",
        }
    }
}

impl fmt::Display for RamUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RamUnit {
    type Err = DescriptorValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "MB" => Ok(RamUnit::Mb),
            "GB" => Ok(RamUnit::Gb),
            _ => Err(DescriptorValueError::UnknownRamUnit(value.to_string())),
        }
    }
}

/// Typed view of a composed RAM value such as `2048MB` or `4GB`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamSize {
    pub amount: u64,
    pub unit: RamUnit,
}

impl RamSize {
    pub fn to_mb(&self) -> u64 {
        match self.unit {
            RamUnit::Mb => self.amount,
            RamUnit::Gb => self.amount * 1024,
        }
    }
}

impl fmt::Display for RamSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

impl FromStr for RamSize {
    type Err = DescriptorValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits_end = value
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(value.len());
        let (amount, unit) = value.split_at(digits_end);
        let unit = match unit {
            "MB" => RamUnit::Mb,
            "GB" => RamUnit::Gb,
            _ => return Err(DescriptorValueError::InvalidRamSize(value.to_string())),
        };
        let amount = amount
            .parse()
            .map_err(|_| DescriptorValueError::InvalidRamSize(value.to_string()))?;
        Ok(RamSize { amount, unit })
    }
}

/// Format of a disk image; unrecognized tags are carried verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum DiskType {
    Qcow2,
    Raw,
    Vhd,
    Vmdk,
    Other(String),
}

impl DiskType {
    pub const KNOWN: [DiskType; 4] = [DiskType::Qcow2, DiskType::Raw, DiskType::Vhd, DiskType::Vmdk];

    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or_else(|_| DiskType::Other(tag.to_string()))
    }

    pub fn tag(&self) -> &str {
        match self {
            DiskType::Qcow2 => "QCOW2",
            DiskType::Raw => "RAW",
            DiskType::Vhd => "VHD",
            DiskType::Vmdk => "VMDK",
            DiskType::Other(tag) => tag,
        }
    }

    /// Format identifier understood by the image tool. Unknown types fall back to qcow2.
    pub fn image_format(&self) -> ImageFormat {
        match self {
            DiskType::Raw => ImageFormat::Raw,
            DiskType::Vhd => ImageFormat::Vpc,
            DiskType::Vmdk => ImageFormat::Vmdk,
            DiskType::Qcow2 | DiskType::Other(_) => ImageFormat::Qcow2,
        }
    }

    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            DiskType::Qcow2 => Some("qcow2"),
            DiskType::Raw => Some("img"),
            DiskType::Vhd => Some("vhd"),
            DiskType::Vmdk => Some("vmdk"),
            DiskType::Other(_) => None,
        }
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DiskType {
    type Err = DescriptorValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DiskType::KNOWN
            .into_iter()
            .find(|disk_type| disk_type.tag().eq_ignore_ascii_case(value))
            .ok_or_else(|| DescriptorValueError::UnknownDiskType(value.to_string()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Qcow2,
    Raw,
    Vpc,
    Vmdk,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Qcow2 => "qcow2",
            ImageFormat::Raw => "raw",
            ImageFormat::Vpc => "vpc",
            ImageFormat::Vmdk => "vmdk",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    pub disk_type: DiskType,
    pub path: Option<PathBuf>,
    /// Decimal megabytes as entered; may be empty or malformed until provisioning coerces it.
    pub capacity_mb: String,
}

impl DiskEntry {
    pub const DEFAULT_CAPACITY_MB: u64 = 10240;

    pub fn new(disk_type: DiskType, path: Option<PathBuf>, capacity_mb: impl Into<String>) -> Self {
        Self {
            disk_type,
            path,
            capacity_mb: capacity_mb.into(),
        }
    }

    /// Separates entries in the persisted disk list.
    pub const LIST_SEPARATOR: char = ';';

    /// Capacity text the disk list can carry verbatim: plain decimal digits.
    pub fn is_decimal_capacity(value: &str) -> bool {
        !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
    }

    /// `false` for paths that would split into several entries when stored.
    pub fn is_storable_path(path: &Path) -> bool {
        !path
            .to_string_lossy()
            .contains([Self::LIST_SEPARATOR, '\n', '\r'])
    }
}

/// Display options; `None` means "not configured".
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct GpuOptions {
    pub vga: Option<String>,
    pub display: Option<String>,
    pub device: Option<String>,
    pub gl: Option<String>,
    pub hostmem: Option<String>,
}

impl GpuOptions {
    pub const VGA_CHOICES: [&'static str; 4] = ["cirrus", "std", "qxl", "virtio"];
    pub const DISPLAY_CHOICES: [&'static str; 4] = ["gtk", "sdl", "vnc", "none"];
    pub const DEVICE_CHOICES: [&'static str; 5] = [
        "virtio-vga",
        "virtio-gpu",
        "virtio-gpu-gl",
        "vhost-user-vga",
        "vhost-user-gpu",
    ];
    pub const GL_CHOICES: [&'static str; 2] = ["off", "on"];
    pub const HOSTMEM_CHOICES: [&'static str; 7] = ["128M", "256M", "512M", "1G", "2G", "4G", "8G"];
}
