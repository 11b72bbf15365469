use num_traits::Float;
use serde::Serialize;

use crate::errors::GosgraphError;
use crate::errors::GosgraphError::{InvalidType, TensorCreateError};
use crate::graph::{Op, Tensor};
use crate::utils::tensor_len;

use super::{check_input_no, Compile, Evaluate, ShaderTemplate};

/// `sum(x^2) / 2` over every element of the input, as a scalar.
#[derive(Debug, Serialize, Clone, Default)]
pub struct L2LossOp {}

impl L2LossOp {
    pub fn new() -> Self {
        Self {}
    }
}

pub fn l2_loss<T: Float>(values: &[T]) -> T {
    let two = T::one() + T::one();
    values.iter().fold(T::zero(), |acc, v| acc + *v * *v) / two
}

impl Evaluate for L2LossOp {
    fn evaluate(&self, op: &Op, inputs: &[&Tensor]) -> Result<Vec<Tensor>, GosgraphError> {
        check_input_no(op, inputs, 1)?;
        let out = match inputs[0] {
            Tensor::F32 {
                values: Some(v), ..
            } => Tensor::F32 {
                values: Some(vec![l2_loss(v.as_slice())]),
                shape: vec![],
            },
            Tensor::F64 {
                values: Some(v), ..
            } => Tensor::F64 {
                values: Some(vec![l2_loss(v.as_slice())]),
                shape: vec![],
            },
            _ => {
                return Err(TensorCreateError(format!(
                    "Input `{}` of `{}` holds no values",
                    op.inputs[0], op.op_name
                )))
            }
        };
        Ok(vec![out])
    }
}

impl Compile for L2LossOp {
    fn compile(
        &self,
        op: &Op,
        shader_templ: &mut ShaderTemplate,
        inputs: &[&Tensor],
    ) -> Result<(), GosgraphError> {
        check_input_no(op, inputs, 1)?;
        let x = inputs[0];
        if !matches!(x, Tensor::F32 { .. }) {
            return Err(InvalidType {
                expected: "f32".into(),
                found: x.tensor_type().as_str().into(),
            });
        }

        shader_templ.push_attr("input_type", &x.type_glsl());
        shader_templ.push_attr("output_type", &x.type_glsl());
        shader_templ.push_attr("numel", &tensor_len(x)?);
        Ok(())
    }

    fn compute_workgroup_size(&self, _op: &Op, _inputs: &[&Tensor]) -> [u32; 3] {
        // the whole reduction runs in one invocation
        [1, 1, 1]
    }

    fn output_shapes(&self, _op: &Op, _inputs: &[&Tensor]) -> Vec<Vec<i64>> {
        vec![vec![]]
    }
}
