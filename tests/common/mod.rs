//! Shared fixture for the integration tests: picks the device the ops are
//! placed on and opens sessions against it.

use gosgraph::gpu::GPUExecutor;
use gosgraph::{Device, DeviceScope, GosgraphError, Graph, Session, SessionConfig};

pub const ENV_TEST_DEVICE: &str = "GOSGRAPH_TEST_DEVICE";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct GraphTest {
    pub device: Device,
    pub config: SessionConfig,
}

impl GraphTest {
    pub fn new(device: Device) -> Self {
        init_logging();
        Self {
            device,
            config: SessionConfig::default(),
        }
    }

    /// Device taken from `GOSGRAPH_TEST_DEVICE`, cpu when unset.
    #[allow(dead_code)]
    pub fn from_env() -> Result<Self, GosgraphError> {
        let device = match std::env::var(ENV_TEST_DEVICE) {
            Ok(v) => v.parse()?,
            Err(_) => Device::Cpu,
        };
        Ok(Self::new(device))
    }

    /// Every device this machine can run, the host always first.
    pub fn all() -> Vec<GraphTest> {
        let mut fixtures = vec![GraphTest::new(Device::Cpu)];
        if gpu_available() {
            fixtures.push(GraphTest::new(Device::Gpu));
        } else {
            log::warn!("no GPU adapter, skipping gpu variants");
        }
        fixtures
    }

    pub fn device<'g>(&self, graph: &'g mut Graph) -> DeviceScope<'g> {
        graph.device(self.device)
    }

    pub fn session<'g>(&self, graph: &'g Graph) -> Result<Session<'g>, GosgraphError> {
        Session::new(graph, self.config.clone())
    }
}

pub fn gpu_available() -> bool {
    match GPUExecutor::new(1) {
        Ok(_) => true,
        Err(GosgraphError::AdapterUnavailable) => false,
        Err(e) => {
            log::warn!("gpu adapter found but unusable: {}", e);
            false
        }
    }
}

pub fn reference_l2_loss(values: &[f32]) -> f64 {
    values.iter().map(|v| (*v as f64).powi(2)).sum::<f64>() / 2.0
}
