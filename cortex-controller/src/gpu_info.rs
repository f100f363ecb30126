//! Host GPU inventory for `GET /admin/system/gpus` (spec.md §6), generalized
//! from the teacher's vendor/capability detection (`hardware/src/gpu.rs`).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub index: u32,
    pub vendor: GpuVendor,
    pub name: String,
    pub vram_mb: Option<u64>,
    pub compute_capability_major: Option<u32>,
    pub compute_capability_minor: Option<u32>,
    pub flash_attention_supported: bool,
}

/// `true` iff compute capability ≥ 8.0 (spec.md §6).
pub fn flash_attention_supported(major: u32, minor: u32) -> bool {
    (major, minor) >= (8, 0)
}

/// Shells out to `nvidia-smi`, the teacher's own approach to GPU discovery
/// on Linux (`hardware/src/platform_linux.rs::detect_gpus`), generalized to
/// also pull compute capability for the flash-attention check. Returns an
/// empty list (not an error) when `nvidia-smi` is absent — an operator
/// without an NVIDIA GPU still gets a working `/admin/system/gpus` response.
pub fn discover() -> Vec<GpuInfo> {
    let output = std::process::Command::new("nvidia-smi")
        .args([
            "--query-gpu=index,name,memory.total,compute_cap",
            "--format=csv,noheader,nounits",
        ])
        .output();

    let Ok(output) = output else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(parse_nvidia_smi_line)
        .collect()
}

fn parse_nvidia_smi_line(line: &str) -> Option<GpuInfo> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        return None;
    }
    let index = parts[0].parse().ok()?;
    let name = parts[1].to_string();
    let vram_mb = parts[2].parse().ok();
    let compute_capability = parts[3]
        .split_once('.')
        .and_then(|(major, minor)| Some((major.parse().ok()?, minor.parse().ok()?)));

    Some(GpuInfo::new(index, GpuVendor::Nvidia, name, vram_mb, compute_capability))
}

impl GpuInfo {
    pub fn new(
        index: u32,
        vendor: GpuVendor,
        name: impl Into<String>,
        vram_mb: Option<u64>,
        compute_capability: Option<(u32, u32)>,
    ) -> Self {
        let flash = compute_capability
            .map(|(major, minor)| flash_attention_supported(major, minor))
            .unwrap_or(false);
        Self {
            index,
            vendor,
            name: name.into(),
            vram_mb,
            compute_capability_major: compute_capability.map(|(m, _)| m),
            compute_capability_minor: compute_capability.map(|(_, m)| m),
            flash_attention_supported: flash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ampere_and_later_supports_flash_attention() {
        assert!(flash_attention_supported(8, 0));
        assert!(flash_attention_supported(9, 0));
    }

    #[test]
    fn pre_ampere_does_not_support_flash_attention() {
        assert!(!flash_attention_supported(7, 5));
    }

    #[test]
    fn unknown_compute_capability_conservatively_reports_unsupported() {
        let gpu = GpuInfo::new(0, GpuVendor::Nvidia, "Unknown GPU", None, None);
        assert!(!gpu.flash_attention_supported);
    }
}

#[cfg(test)]
mod discover_tests {
    use super::parse_nvidia_smi_line;

    #[test]
    fn parses_a_typical_nvidia_smi_line() {
        let gpu = parse_nvidia_smi_line("0, NVIDIA A100-SXM4-80GB, 81920, 8.0").unwrap();
        assert_eq!(gpu.index, 0);
        assert_eq!(gpu.vram_mb, Some(81920));
        assert!(gpu.flash_attention_supported);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_nvidia_smi_line("not,enough").is_none());
    }
}
