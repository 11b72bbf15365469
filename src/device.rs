use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GosgraphError;
use crate::graph::Graph;

/// Execution backend an op is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = GosgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            other => Err(GosgraphError::ConfigError(format!(
                "Unknown device `{}`",
                other
            ))),
        }
    }
}

/// Ops created through the scope are placed on its device. The graph's
/// previous device is restored when the scope is dropped.
pub struct DeviceScope<'g> {
    graph: &'g mut Graph,
    previous: Device,
}

impl<'g> DeviceScope<'g> {
    pub(crate) fn new(graph: &'g mut Graph, device: Device) -> Self {
        let previous = graph.current_device();
        graph.set_current_device(device);
        log::trace!("entering device scope {} (was {})", device, previous);
        Self { graph, previous }
    }
}

impl Deref for DeviceScope<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        self.graph
    }
}

impl DerefMut for DeviceScope<'_> {
    fn deref_mut(&mut self) -> &mut Graph {
        self.graph
    }
}

impl Drop for DeviceScope<'_> {
    fn drop(&mut self) {
        log::trace!("leaving device scope, restoring {}", self.previous);
        self.graph.set_current_device(self.previous);
    }
}
