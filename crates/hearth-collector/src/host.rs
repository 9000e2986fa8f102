//! Host series backed by `sysinfo` and `vcgencmd`.
//!
//! All host series share one [`HostSampler`] so a collection cycle pays
//! for one system refresh, not one per series. Temperatures are reported
//! in Fahrenheit.

use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;
use sysinfo::{Components, Disks, System};
use tracing::debug;

use crate::registry::LocalRegistry;
use crate::series::LocalSeries;

fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Shared system probe for all host series.
///
/// Each accessor refreshes only the slice of system state it needs and
/// holds its own lock, so concurrent reads of different series do not
/// serialize on one global refresh.
pub struct HostSampler {
    system: Mutex<System>,
    components: Mutex<Components>,
    disks: Mutex<Disks>,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    /// Creates a sampler with freshly enumerated hardware lists.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            components: Mutex::new(Components::new_with_refreshed_list()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }

    /// Overall CPU usage percentage.
    ///
    /// Usage is computed between consecutive refreshes; the very first
    /// read after startup may report 0.
    #[must_use]
    pub fn cpu_usage(&self) -> Option<f64> {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        Some(f64::from(system.global_cpu_usage()))
    }

    /// RAM usage percentage.
    #[must_use]
    pub fn memory_usage(&self) -> Option<f64> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        Some(system.used_memory() as f64 / total as f64 * 100.0)
    }

    /// CPU temperature in Fahrenheit, from the first thermal component
    /// whose label looks CPU-related.
    #[must_use]
    pub fn cpu_temperature(&self) -> Option<f64> {
        let mut components = self.components.lock();
        components.refresh(false);

        components
            .iter()
            .find(|c| {
                let label = c.label().to_ascii_lowercase();
                label.contains("cpu") || label.contains("coretemp") || label.contains("k10temp")
            })
            .and_then(|c| c.temperature())
            .map(|c| celsius_to_fahrenheit(f64::from(c)))
    }

    /// Root filesystem usage percentage.
    #[must_use]
    pub fn disk_usage(&self) -> Option<f64> {
        let mut disks = self.disks.lock();
        disks.refresh(false);

        let root = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))?;
        let total = root.total_space();
        if total == 0 {
            return None;
        }
        let used = total - root.available_space();
        Some(used as f64 / total as f64 * 100.0)
    }

    /// GPU temperature in Fahrenheit, via `vcgencmd measure_temp`.
    ///
    /// Only available on Raspberry Pi class hardware; anywhere else the
    /// command is missing and this returns `None`.
    #[must_use]
    pub fn gpu_temperature(&self) -> Option<f64> {
        let output = Command::new("vcgencmd").arg("measure_temp").output().ok()?;
        if !output.status.success() {
            debug!("vcgencmd measure_temp exited nonzero");
            return None;
        }
        let text = String::from_utf8(output.stdout).ok()?;
        parse_vcgencmd_temp(&text).map(celsius_to_fahrenheit)
    }
}

impl std::fmt::Debug for HostSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSampler").finish_non_exhaustive()
    }
}

/// Parses `temp=48.3'C` style output into degrees Celsius.
fn parse_vcgencmd_temp(output: &str) -> Option<f64> {
    let rest = output.trim().strip_prefix("temp=")?;
    let digits = rest.trim_end_matches(|c: char| !c.is_ascii_digit());
    digits.parse::<f64>().ok()
}

macro_rules! host_series {
    ($type:ident, $id:literal, $name:literal, $units:literal, $desc:literal, $accessor:ident) => {
        #[doc = concat!("Built-in `", $id, "` series.")]
        #[derive(Debug)]
        pub struct $type(Arc<HostSampler>);

        impl $type {
            /// Creates the series over a shared sampler.
            #[must_use]
            pub fn new(sampler: Arc<HostSampler>) -> Self {
                Self(sampler)
            }
        }

        impl LocalSeries for $type {
            fn id(&self) -> &str {
                $id
            }
            fn name(&self) -> &str {
                $name
            }
            fn units(&self) -> &str {
                $units
            }
            fn tags(&self) -> Vec<String> {
                vec!["host".to_string(), "system".to_string()]
            }
            fn description(&self) -> &str {
                $desc
            }
            fn read(&self) -> Option<f64> {
                self.0.$accessor()
            }
        }
    };
}

host_series!(
    CpuTemperature,
    "cpu_temperature",
    "CPU Temperature",
    "°F",
    "Temperature of the host CPU",
    cpu_temperature
);
host_series!(
    GpuTemperature,
    "gpu_temperature",
    "GPU Temperature",
    "°F",
    "Temperature of the host GPU",
    gpu_temperature
);
host_series!(
    CpuUsage,
    "cpu_usage",
    "CPU Usage",
    "%",
    "Overall CPU utilization",
    cpu_usage
);
host_series!(
    MemoryUsage,
    "memory_usage",
    "Memory Usage",
    "%",
    "RAM in use as a share of total",
    memory_usage
);
host_series!(
    DiskUsage,
    "disk_usage",
    "Disk Usage",
    "%",
    "Root filesystem space in use",
    disk_usage
);

/// Registers every host series over one shared sampler.
pub fn register_host_series(registry: &mut LocalRegistry) {
    let sampler = Arc::new(HostSampler::new());
    registry.register(Arc::new(CpuTemperature::new(Arc::clone(&sampler))));
    registry.register(Arc::new(GpuTemperature::new(Arc::clone(&sampler))));
    registry.register(Arc::new(CpuUsage::new(Arc::clone(&sampler))));
    registry.register(Arc::new(MemoryUsage::new(Arc::clone(&sampler))));
    registry.register(Arc::new(DiskUsage::new(sampler)));
}
