use anyhow::bail;
use log::{info, warn};
use vm_manager::{
    managers::{
        descriptor_editor::{CommitReport, DescriptorEditor},
        vm_config_manager::VmConfigManager,
        vm_descriptor::DiskEntry,
    },
    storage::codec,
    virtualization::{host_memory::HostMemory, image_tool::ImageTool},
};

use crate::commands::{Command, FieldArgs};

pub struct CommandHandler<T: ImageTool, M: HostMemory> {
    manager: VmConfigManager<T, M>,
    preallocate_full: bool,
}

impl<T: ImageTool + Send + Sync, M: HostMemory> CommandHandler<T, M> {
    pub fn new(manager: VmConfigManager<T, M>, preallocate_full: bool) -> Self {
        Self {
            manager,
            preallocate_full,
        }
    }

    pub async fn handle_command(&self, command: Command) -> Result<(), anyhow::Error> {
        match command {
            Command::List => {
                for descriptor in self.manager.list().await? {
                    let ram = match (descriptor.ram_size(), descriptor.ram.as_deref()) {
                        (Some(size), _) => format!("{} MB", size.to_mb()),
                        (None, Some(text)) => text.to_string(),
                        (None, None) => "-".to_string(),
                    };
                    println!(
                        "{}\t{}\t{} disk(s)",
                        descriptor.name,
                        ram,
                        descriptor.disks.len()
                    );
                }
                Ok(())
            }
            Command::Show { name, json } => {
                if !self.manager.store().exists(&name).await? {
                    bail!("VM '{}' does not exist", name);
                }
                let parsed = self.manager.store().load(&name).await?;
                for line in &parsed.ignored {
                    warn!("Line {} ignored ({:?}): {}", line.number, line.reason, line.content);
                }
                if json {
                    println!("{}", serde_json::to_string_pretty(&parsed.descriptor)?);
                } else {
                    print!("{}", codec::serialize(&parsed.descriptor));
                }
                Ok(())
            }
            Command::Create { name, fields } => {
                if self.manager.store().exists(&name).await? {
                    bail!("VM '{}' already exists", name);
                }
                let mut editor = self.manager.open_editor(None).await?;
                *editor.descriptor_mut().name = name;
                self.apply_and_commit(editor, fields).await
            }
            Command::Edit {
                name,
                rename,
                fields,
            } => {
                if !self.manager.store().exists(&name).await? {
                    bail!("VM '{}' does not exist", name);
                }
                let mut editor = self.manager.open_editor(Some(&name)).await?;
                for line in editor.ignored_lines() {
                    warn!(
                        "Line {} of '{}' will be dropped on save ({:?}): {}",
                        line.number, name, line.reason, line.content
                    );
                }
                if let Some(new_name) = rename {
                    *editor.descriptor_mut().name = new_name;
                }
                self.apply_and_commit(editor, fields).await
            }
            Command::Delete { name, with_disks } => {
                let removed = self.manager.delete(&name, with_disks).await?;
                for disk in removed {
                    if let Some(path) = disk.path {
                        info!("Removed disk image {}", path.display());
                    }
                }
                info!("Deleted VM '{}'", name);
                Ok(())
            }
            Command::ProbeDisk { disk_type, path } => {
                println!("{}", self.manager.probe_disk(&path, &disk_type).await);
                Ok(())
            }
            Command::RamOptions { unit } => {
                let options: Vec<String> = self
                    .manager
                    .ram_options(unit)
                    .iter()
                    .map(|option| format!("{}{}", option, unit))
                    .collect();
                println!("{}", options.join(" "));
                Ok(())
            }
            Command::CheckRam { amount, unit } => {
                let check = self.manager.check_ram(amount, unit);
                println!("{}{}", check.effective, unit);
                if check.clamped {
                    warn!("{}{} exceeds host memory, clamped", amount, unit);
                }
                if let Some(warning) = check.warning {
                    warn!("{}", warning);
                }
                Ok(())
            }
        }
    }

    async fn apply_and_commit(
        &self,
        mut editor: DescriptorEditor,
        fields: FieldArgs,
    ) -> Result<(), anyhow::Error> {
        let preallocate = fields.preallocate || self.preallocate_full;
        let delete_disk_files = fields.delete_disk_files;
        let removed = self.apply_fields(&mut editor, fields).await?;

        if !editor.is_dirty() && !editor.has_missing_images() && editor.original_name().is_some()
        {
            info!("Nothing to change");
            return Ok(());
        }
        let report = self.manager.commit(&mut editor, preallocate).await?;
        print_report(&report);

        if delete_disk_files {
            for disk in removed {
                if let Some(path) = disk.path.as_deref() {
                    self.manager.provisioner().remove_image(path).await?;
                }
            }
        }
        Ok(())
    }

    /// Returns the disks dropped from the descriptor.
    async fn apply_fields(
        &self,
        editor: &mut DescriptorEditor,
        fields: FieldArgs,
    ) -> Result<Vec<DiskEntry>, anyhow::Error> {
        {
            let descriptor = editor.descriptor_mut();
            set_text(&mut descriptor.cpu.model, fields.cpu_model);
            set_text(&mut descriptor.cpu.cores, fields.cpu_cores);
            set_text(&mut descriptor.cpu.sockets, fields.cpu_sockets);
            set_text(&mut descriptor.cpu.threads, fields.cpu_threads);
            set_text(&mut descriptor.cpu.features, fields.cpu_features);
            set_text(&mut descriptor.gpu.vga, fields.vga);
            set_text(&mut descriptor.gpu.display, fields.display);
            set_text(&mut descriptor.gpu.device, fields.gpu_device);
            set_text(&mut descriptor.gpu.gl, fields.gl);
            set_text(&mut descriptor.gpu.hostmem, fields.hostmem);
            set_text(descriptor.network, fields.network);
            set_text(descriptor.hardware, fields.hardware);
        }

        let current_accelerator = editor.descriptor().cpu.accelerator;
        match (fields.accel, fields.accelerator) {
            (Some(enabled), accelerator) => {
                editor.set_accelerator(enabled, accelerator.or(current_accelerator))
            }
            (None, Some(accelerator)) => editor.set_accelerator(true, Some(accelerator)),
            (None, None) => {}
        }

        if let Some(ram) = fields.ram {
            let check = self.manager.check_ram(ram.amount, ram.unit);
            if check.clamped {
                warn!("{} exceeds host memory, using {}{}", ram, check.effective, ram.unit);
            }
            if let Some(warning) = check.warning {
                warn!("{}", warning);
            }
            editor.set_ram(check.effective, ram.unit);
        }

        for change in fields.disk_capacity {
            let stored = editor.set_disk_capacity(change.index, &change.capacity)?;
            if stored != change.capacity {
                warn!(
                    "Disk {} can't shrink below its current size, keeping {} MB",
                    change.index, stored
                );
            }
        }

        let mut indices = fields.remove_disk;
        indices.sort_unstable();
        indices.dedup();
        let mut removed = vec![];
        for index in indices.into_iter().rev() {
            removed.push(editor.remove_disk(index)?);
        }

        for disk in fields.add_disk {
            let index = editor.add_disk(disk.disk_type, Some(disk.path))?;
            if let Some(capacity) = disk.capacity {
                editor.set_disk_capacity(index, &capacity)?;
            }
        }
        for disk in fields.import_disk {
            let index = editor
                .import_disk(disk.disk_type, disk.path, self.manager.provisioner())
                .await?;
            let slot = &editor.disks()[index];
            if slot.floor_mb() == 0 {
                warn!(
                    "Couldn't read the size of {:?}, assuming {} MB",
                    slot.entry().path,
                    slot.entry().capacity_mb
                );
            }
        }
        Ok(removed)
    }
}

fn set_text(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *target = (!value.is_empty()).then_some(value);
    }
}

fn print_report(report: &CommitReport) {
    for path in &report.created {
        println!("Created disk image {}", path.display());
    }
    for degraded in &report.degraded {
        println!(
            "Warning: {} was created without preallocation ({})",
            degraded.path.display(),
            degraded.reason
        );
    }
    println!("Saved VM '{}'", report.descriptor.name);
}
