use crate::cache::Kernel;
use crate::device::Device;
use crate::errors::GosgraphError;
use crate::graph::{Op, Tensor};

/// Runs single ops on one device. Inputs and outputs are host-resident.
pub trait Executor {
    fn device(&self) -> Device;

    fn execute_op(
        &mut self,
        op: &Op,
        kernel: &Kernel,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, GosgraphError>;
}

#[derive(Default)]
pub struct CpuExecutor {}

impl CpuExecutor {
    pub fn new() -> Self {
        Self {}
    }
}

impl Executor for CpuExecutor {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn execute_op(
        &mut self,
        op: &Op,
        kernel: &Kernel,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, GosgraphError> {
        if *kernel != Kernel::Host {
            return Err(GosgraphError::Error(format!(
                "Op `{}` was compiled for another device",
                op.op_name
            )));
        }
        log::trace!("cpu: evaluating `{}` ({})", op.op_name, op.op_type);
        op.op_type.as_evaluate().evaluate(op, inputs)
    }
}
