use std::fmt;

use serde::Serialize;

use crate::errors::GosgraphError;
use crate::graph::{Op, Tensor};

pub mod l2_loss;

use l2_loss::L2LossOp;

#[derive(Debug, Clone)]
pub enum OpType {
    L2Loss { attr: L2LossOp },
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpType::L2Loss { .. } => write!(f, "L2Loss"),
        }
    }
}

impl OpType {
    pub fn as_compile(&self) -> &dyn Compile {
        match self {
            OpType::L2Loss { attr } => attr,
        }
    }

    pub fn as_evaluate(&self) -> &dyn Evaluate {
        match self {
            OpType::L2Loss { attr } => attr,
        }
    }
}

/// A tera template of a GLSL compute shader plus the attributes it is
/// rendered with.
pub struct ShaderTemplate {
    name: String,
    tera: tera::Tera,
    context: tera::Context,
}

impl ShaderTemplate {
    pub fn new(name: &str, source: &str) -> Result<Self, GosgraphError> {
        let mut tera = tera::Tera::default();
        tera.add_raw_template(name, source)
            .map_err(|e| GosgraphError::ShaderCompileError(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            tera,
            context: tera::Context::new(),
        })
    }

    pub fn push_attr<T: Serialize + ?Sized>(&mut self, k: &str, v: &T) {
        self.context.insert(k, v);
    }

    pub fn render(&self) -> Result<String, GosgraphError> {
        self.tera
            .render(&self.name, &self.context)
            .map_err(|e| GosgraphError::ShaderCompileError(e.to_string()))
    }
}

/// GPU side of an op: fills the shader template and sizes the dispatch.
pub trait Compile {
    fn compile(
        &self,
        op: &Op,
        shader_templ: &mut ShaderTemplate,
        inputs: &[&Tensor],
    ) -> Result<(), GosgraphError>;

    fn compute_workgroup_size(&self, op: &Op, inputs: &[&Tensor]) -> [u32; 3];

    /// Shape of each output given the resolved inputs.
    fn output_shapes(&self, op: &Op, inputs: &[&Tensor]) -> Vec<Vec<i64>>;
}

/// Host side of an op.
pub trait Evaluate {
    fn evaluate(&self, op: &Op, inputs: &[&Tensor]) -> Result<Vec<Tensor>, GosgraphError>;
}

pub(crate) fn check_input_no(op: &Op, inputs: &[&Tensor], expected: usize) -> Result<(), GosgraphError> {
    if inputs.len() != expected || op.inputs.len() != expected {
        return Err(GosgraphError::InvalidInputNo {
            expected,
            found: inputs.len(),
        });
    }
    Ok(())
}
