use super::non_empty;
use crate::managers::vm_descriptor::GpuOptions;

const VGA_KEY: &str = "vga";
const DISPLAY_KEY: &str = "display";
const DEVICE_KEY: &str = "device";
const GL_KEY: &str = "gl";
const HOSTMEM_KEY: &str = "hostmem";

/// Values that are selected but not worth persisting.
const DISPLAY_DEFAULT: &str = "none";
const GL_DEFAULT: &str = "off";

pub fn decode(options: &str) -> GpuOptions {
    let mut gpu = GpuOptions::default();
    for pair in options.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = non_empty(value);
        match key.trim() {
            VGA_KEY => gpu.vga = value,
            DISPLAY_KEY => gpu.display = value,
            DEVICE_KEY => gpu.device = value,
            GL_KEY => gpu.gl = value,
            HOSTMEM_KEY => gpu.hostmem = value,
            _ => {}
        }
    }
    gpu
}

/// `display=none` and `gl=off` are left out, so decoding the result won't
/// give them back.
pub fn encode(gpu: &GpuOptions) -> String {
    let mut pairs = vec![];
    push_pair(&mut pairs, VGA_KEY, gpu.vga.as_deref(), None);
    push_pair(&mut pairs, DISPLAY_KEY, gpu.display.as_deref(), Some(DISPLAY_DEFAULT));
    push_pair(&mut pairs, DEVICE_KEY, gpu.device.as_deref(), None);
    push_pair(&mut pairs, GL_KEY, gpu.gl.as_deref(), Some(GL_DEFAULT));
    push_pair(&mut pairs, HOSTMEM_KEY, gpu.hostmem.as_deref(), None);
    pairs.join(",")
}

fn push_pair(pairs: &mut Vec<String>, key: &str, value: Option<&str>, skipped: Option<&str>) {
    match value {
        Some(value) if !value.is_empty() && Some(value) != skipped => {
            pairs.push(format!("{}={}", key, value))
        }
        _ => {}
    }
}
