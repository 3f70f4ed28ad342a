use std::{path::PathBuf, str::FromStr};

use clap::{Args, Subcommand};
use vm_manager::managers::vm_descriptor::{
    Accelerator, DiskEntry, DiskType, GpuOptions, RamSize, RamUnit,
};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List all configured VMs
    List,

    /// Print one VM descriptor
    Show {
        name: String,

        /// Print as JSON instead of the descriptor file format
        #[clap(long)]
        json: bool,
    },

    /// Create a new VM descriptor and its missing disk images
    Create {
        name: String,

        #[clap(flatten)]
        fields: FieldArgs,
    },

    /// Change an existing VM descriptor
    Edit {
        name: String,

        /// New VM name
        #[clap(long)]
        rename: Option<String>,

        #[clap(flatten)]
        fields: FieldArgs,
    },

    /// Delete a VM descriptor
    Delete {
        name: String,

        /// Also delete the disk images the VM references
        #[clap(long)]
        with_disks: bool,
    },

    /// Print the size of a disk image in MB (0 when unknown)
    ProbeDisk { disk_type: DiskType, path: PathBuf },

    /// List the RAM sizes that fit into host memory
    RamOptions { unit: RamUnit },

    /// Check a RAM size against host memory
    CheckRam { amount: u64, unit: RamUnit },
}

/// Descriptor fields shared by `create` and `edit`. Passing an empty string
/// clears a text field. Disk changes apply in order: capacities, removals,
/// then additions and imports.
#[derive(Args, Debug, Clone, PartialEq, Default)]
pub struct FieldArgs {
    /// CPU model
    #[clap(long)]
    pub cpu_model: Option<String>,

    /// CPU core count
    #[clap(long)]
    pub cpu_cores: Option<String>,

    /// CPU socket count
    #[clap(long)]
    pub cpu_sockets: Option<String>,

    /// CPU threads per core
    #[clap(long)]
    pub cpu_threads: Option<String>,

    /// CPU feature flags, e.g. "+ssse3,-sse4.2"
    #[clap(long)]
    pub cpu_features: Option<String>,

    /// Enable hardware acceleration
    #[clap(long)]
    pub accel: Option<bool>,

    /// Accelerator (TCG, KVM, Xen, hvf, whpx, nvmm)
    #[clap(long)]
    pub accelerator: Option<Accelerator>,

    /// RAM size, e.g. 2048MB or 4GB
    #[clap(long)]
    pub ram: Option<RamSize>,

    /// New disk as TYPE:PATH[:CAPACITY_MB]
    #[clap(long)]
    pub add_disk: Vec<DiskSpec>,

    /// Existing disk image as TYPE:PATH
    #[clap(long)]
    pub import_disk: Vec<DiskSpec>,

    /// Disk capacity change as INDEX=MB
    #[clap(long)]
    pub disk_capacity: Vec<CapacityChange>,

    /// Index of a disk to drop from the descriptor
    #[clap(long)]
    pub remove_disk: Vec<usize>,

    /// Delete the image files of removed disks
    #[clap(long)]
    pub delete_disk_files: bool,

    /// Emulated VGA card
    #[clap(long, value_parser = GpuOptions::VGA_CHOICES)]
    pub vga: Option<String>,

    /// Display backend
    #[clap(long, value_parser = GpuOptions::DISPLAY_CHOICES)]
    pub display: Option<String>,

    /// GPU device
    #[clap(long, value_parser = GpuOptions::DEVICE_CHOICES)]
    pub gpu_device: Option<String>,

    /// OpenGL acceleration
    #[clap(long, value_parser = GpuOptions::GL_CHOICES)]
    pub gl: Option<String>,

    /// Host memory reserved for the GPU
    #[clap(long, value_parser = GpuOptions::HOSTMEM_CHOICES)]
    pub hostmem: Option<String>,

    /// Network options passed through to the VM
    #[clap(long)]
    pub network: Option<String>,

    /// Extra hardware options passed through to the VM
    #[clap(long)]
    pub hardware: Option<String>,

    /// Fully preallocate new qcow2 images
    #[clap(long)]
    pub preallocate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskSpec {
    pub disk_type: DiskType,
    pub path: PathBuf,
    pub capacity: Option<String>,
}

impl FromStr for DiskSpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = value
            .split_once(':')
            .ok_or_else(|| format!("expected TYPE:PATH[:CAPACITY_MB], got '{}'", value))?;
        let disk_type = tag.parse::<DiskType>().map_err(|err| err.to_string())?;
        let (path, capacity) = match rest.rsplit_once(':') {
            Some((path, capacity))
                if !capacity.is_empty() && capacity.chars().all(|ch| ch.is_ascii_digit()) =>
            {
                (path, Some(capacity.to_string()))
            }
            _ => (rest, None),
        };
        if path.is_empty() {
            return Err(format!("missing disk path in '{}'", value));
        }
        Ok(Self {
            disk_type,
            path: PathBuf::from(path),
            capacity,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapacityChange {
    pub index: usize,
    pub capacity: String,
}

impl FromStr for CapacityChange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (index, capacity) = value
            .split_once('=')
            .ok_or_else(|| format!("expected INDEX=MB, got '{}'", value))?;
        let index = index
            .trim()
            .parse()
            .map_err(|_| format!("invalid disk index '{}'", index))?;
        if !DiskEntry::is_decimal_capacity(capacity) {
            return Err(format!("invalid disk capacity '{}', expected MB", capacity));
        }
        Ok(Self {
            index,
            capacity: capacity.to_string(),
        })
    }
}
