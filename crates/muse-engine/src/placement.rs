use std::fmt;
use std::process::{Command, Stdio};
use std::str::FromStr;

use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cuda,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// 16-bit floats, chosen on accelerated hardware.
    Half,
    Full,
}

impl ComputeDevice {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeDevice::Cuda => "cuda",
            ComputeDevice::Cpu => "cpu",
        }
    }
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Half => "float16",
            Precision::Full => "float32",
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where (and at what precision) the image model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPlacement {
    pub device: ComputeDevice,
    pub precision: Precision,
}

impl ModelPlacement {
    pub fn for_device(device: ComputeDevice) -> Self {
        let precision = match device {
            ComputeDevice::Cuda => Precision::Half,
            ComputeDevice::Cpu => Precision::Full,
        };
        Self { device, precision }
    }

    pub fn resolve(preference: DevicePreference) -> Self {
        let device = match preference {
            DevicePreference::Cuda => ComputeDevice::Cuda,
            DevicePreference::Cpu => ComputeDevice::Cpu,
            DevicePreference::Auto if is_cuda_available() => ComputeDevice::Cuda,
            DevicePreference::Auto => ComputeDevice::Cpu,
        };
        Self::for_device(device)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(DevicePreference::Auto),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "cpu" => Ok(DevicePreference::Cpu),
            other => bail!("unsupported device '{other}' (expected auto, cuda or cpu)"),
        }
    }
}

/// True when the NVIDIA driver tooling answers, i.e. a CUDA device is usable.
pub fn is_cuda_available() -> bool {
    Command::new("nvidia-smi")
        .arg("-L")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
