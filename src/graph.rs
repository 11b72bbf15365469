use std::collections::HashMap;

use crate::device::{Device, DeviceScope};
use crate::errors::GosgraphError;
use crate::errors::GosgraphError::{
    DuplicateName, IncompatibleShape, InvalidType, TensorCreateError, TensorNotFound,
};
use crate::ops::l2_loss::L2LossOp;
use crate::ops::OpType;
use crate::utils::numel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    F32,
    F64,
}

impl TensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorType::F32 => "f32",
            TensorType::F64 => "f64",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F32 {
        values: Option<Vec<f32>>,
        shape: Vec<i64>,
    },
    F64 {
        values: Option<Vec<f64>>,
        shape: Vec<i64>,
    },
}

impl Tensor {
    pub fn from_f32(values: Vec<f32>, shape: Vec<i64>) -> Result<Self, GosgraphError> {
        check_len(values.len(), &shape, "f32")?;
        Ok(Tensor::F32 {
            values: Some(values),
            shape,
        })
    }

    pub fn from_f64(values: Vec<f64>, shape: Vec<i64>) -> Result<Self, GosgraphError> {
        check_len(values.len(), &shape, "f64")?;
        Ok(Tensor::F64 {
            values: Some(values),
            shape,
        })
    }

    pub fn scalar_f32(value: f32) -> Self {
        Tensor::F32 {
            values: Some(vec![value]),
            shape: vec![],
        }
    }

    /// Tensor of `shape` holding NaN everywhere: what a placeholder fed with
    /// no value evaluates to.
    pub fn nan(tensor_type: TensorType, shape: Vec<i64>) -> Result<Self, GosgraphError> {
        let n = numel(&shape)?;
        Ok(match tensor_type {
            TensorType::F32 => Tensor::F32 {
                values: Some(filled(n, f32::NAN, &shape)?),
                shape,
            },
            TensorType::F64 => Tensor::F64 {
                values: Some(filled(n, f64::NAN, &shape)?),
                shape,
            },
        })
    }

    pub fn shape(&self) -> Vec<i64> {
        match self {
            Tensor::F32 { values: _, shape } => shape.clone(),
            Tensor::F64 { values: _, shape } => shape.clone(),
        }
    }

    pub fn tensor_type(&self) -> TensorType {
        match self {
            Tensor::F32 { .. } => TensorType::F32,
            Tensor::F64 { .. } => TensorType::F64,
        }
    }

    pub fn type_glsl(&self) -> String {
        match self {
            Tensor::F32 { .. } => "float".into(),
            Tensor::F64 { .. } => "double".into(),
        }
    }

    pub fn has_values(&self) -> bool {
        match self {
            Tensor::F32 { values, .. } => values.is_some(),
            Tensor::F64 { values, .. } => values.is_some(),
        }
    }

    /// Values widened to f64, `None` if the tensor is not materialized.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Tensor::F32 { values, .. } => values
                .as_ref()
                .map(|v| v.iter().map(|x| *x as f64).collect()),
            Tensor::F64 { values, .. } => values.clone(),
        }
    }

    /// The single value of a one-element tensor.
    pub fn scalar_value(&self) -> Option<f64> {
        match self.to_f64_vec() {
            Some(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub(crate) fn empty_like(tensor_type: TensorType, shape: Vec<i64>) -> Self {
        match tensor_type {
            TensorType::F32 => Tensor::F32 {
                values: None,
                shape,
            },
            TensorType::F64 => Tensor::F64 {
                values: None,
                shape,
            },
        }
    }
}

fn filled<T: Copy>(n: usize, value: T, shape: &[i64]) -> Result<Vec<T>, GosgraphError> {
    let mut values = Vec::new();
    values.try_reserve_exact(n).map_err(|e| {
        TensorCreateError(format!("Cannot allocate tensor of shape {:?}: {}", shape, e))
    })?;
    values.resize(n, value);
    Ok(values)
}

fn check_len(len: usize, shape: &[i64], type_name: &str) -> Result<(), GosgraphError> {
    if shape.iter().any(|d| *d < 0) {
        return Err(TensorCreateError(format!(
            "Concrete {} tensor cannot have unknown dims {:?}",
            type_name, shape
        )));
    }
    if len != numel(shape)? {
        return Err(TensorCreateError(format!(
            "Cannot create {} tensor of {} values and resize it to {:?}",
            type_name, len, shape
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Op {
    pub op_type: OpType,
    pub op_name: String,
    pub device: Device,
    pub prevs: Vec<String>,
    pub nexts: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

pub struct Graph {
    pub tensor_map: HashMap<String, Tensor>,
    pub op_map: HashMap<String, Op>,
    pub placeholders: Vec<String>,
    current_device: Device,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            tensor_map: HashMap::new(),
            op_map: HashMap::new(),
            placeholders: vec![],
            current_device: Device::default(),
        }
    }

    pub fn current_device(&self) -> Device {
        self.current_device
    }

    pub(crate) fn set_current_device(&mut self, device: Device) {
        self.current_device = device;
    }

    /// Place every op created through the returned scope on `device`.
    pub fn device(&mut self, device: Device) -> DeviceScope<'_> {
        DeviceScope::new(self, device)
    }

    pub fn with_device<T, F>(&mut self, device: Device, f: F) -> T
    where
        F: FnOnce(&mut Graph) -> T,
    {
        let mut scope = self.device(device);
        f(&mut *scope)
    }

    pub fn placeholder_f32(&mut self, name: &str, shape: Vec<i64>) -> Result<String, GosgraphError> {
        self.new_placeholder(name, TensorType::F32, shape)
    }

    pub fn placeholder_f64(&mut self, name: &str, shape: Vec<i64>) -> Result<String, GosgraphError> {
        self.new_placeholder(name, TensorType::F64, shape)
    }

    fn new_placeholder(
        &mut self,
        name: &str,
        tensor_type: TensorType,
        shape: Vec<i64>,
    ) -> Result<String, GosgraphError> {
        if self.tensor_map.contains_key(name) {
            return Err(DuplicateName(name.to_string()));
        }
        if shape.iter().any(|d| *d < -1) {
            return Err(TensorCreateError(format!(
                "Invalid placeholder shape {:?}",
                shape
            )));
        }
        log::debug!(
            "placeholder `{}` {} {:?}",
            name,
            tensor_type.as_str(),
            shape
        );
        self.tensor_map
            .insert(name.into(), Tensor::empty_like(tensor_type, shape));
        self.placeholders.push(name.to_string());
        Ok(name.to_string())
    }

    pub fn is_placeholder(&self, name: &str) -> bool {
        self.placeholders.iter().any(|p| p == name)
    }

    pub fn new_tensor_f32(
        &mut self,
        tensor_name: &str,
        values: Option<Vec<f32>>,
        shape: Vec<i64>,
    ) -> Result<(), GosgraphError> {
        if let Some(vals) = &values {
            check_len(vals.len(), &shape, "f32")?;
        }
        self.tensor_map
            .insert(tensor_name.into(), Tensor::F32 { values, shape });
        Ok(())
    }

    pub fn new_tensor_f64(
        &mut self,
        tensor_name: &str,
        values: Option<Vec<f64>>,
        shape: Vec<i64>,
    ) -> Result<(), GosgraphError> {
        if let Some(vals) = &values {
            check_len(vals.len(), &shape, "f64")?;
        }
        self.tensor_map
            .insert(tensor_name.into(), Tensor::F64 { values, shape });
        Ok(())
    }

    pub fn new_op(
        &mut self,
        input_names: Vec<&str>,
        output_names: Vec<&str>,
        op_name: &str,
        op_type: OpType,
    ) -> Result<(), GosgraphError> {
        if self.op_map.contains_key(op_name) {
            return Err(DuplicateName(op_name.to_string()));
        }
        for name in input_names.iter().chain(output_names.iter()) {
            if !self.tensor_map.contains_key(*name) {
                return Err(TensorNotFound(name.to_string()));
            }
        }
        log::debug!(
            "op `{}` ({}) on {}: {:?} -> {:?}",
            op_name,
            op_type,
            self.current_device,
            input_names,
            output_names
        );
        self.op_map.insert(
            op_name.into(),
            Op {
                op_type,
                op_name: String::from(op_name),
                device: self.current_device,
                prevs: vec![],
                nexts: vec![], // this will be filled later
                inputs: input_names.iter().map(|s| s.to_string()).collect(),
                outputs: output_names.iter().map(|s| s.to_string()).collect(),
            },
        );
        self.build_connections();
        Ok(())
    }

    /// Add an L2Loss op reading `input` and return the name of its scalar
    /// output tensor.
    pub fn l2_loss(&mut self, input: &str) -> Result<String, GosgraphError> {
        let tensor_type = match self.tensor_map.get(input) {
            Some(t) => t.tensor_type(),
            None => return Err(TensorNotFound(input.to_string())),
        };
        let id = uuid::Uuid::new_v4();
        let output_name = format!("l2_loss_{}:0", id);
        let op_name = format!("l2_loss_{}", id);
        self.tensor_map
            .insert(output_name.clone(), Tensor::empty_like(tensor_type, vec![]));
        self.new_op(
            vec![input],
            vec![&output_name],
            &op_name,
            OpType::L2Loss {
                attr: L2LossOp::new(),
            },
        )?;
        Ok(output_name)
    }

    /// For all (A, B) op pairs in graph, connect A and B if one of A's outputs
    /// is consumed by B and A != B.
    pub fn build_connections(&mut self) {
        for op in self.op_map.values_mut() {
            op.prevs.clear();
            op.nexts.clear();
        }
        let mut edges: Vec<(String, String)> = vec![];
        for from in self.op_map.values() {
            for to in self.op_map.values() {
                if from.op_name == to.op_name {
                    continue;
                }
                if from.outputs.iter().any(|o| to.inputs.contains(o)) {
                    edges.push((from.op_name.clone(), to.op_name.clone()));
                }
            }
        }
        for (from, to) in edges {
            if let Some(op) = self.op_map.get_mut(&from) {
                op.nexts.push(to.clone());
            }
            if let Some(op) = self.op_map.get_mut(&to) {
                op.prevs.push(from);
            }
        }
    }

    pub fn producer_of(&self, tensor_name: &str) -> Option<&Op> {
        self.op_map
            .values()
            .find(|o| o.outputs.iter().any(|out| out == tensor_name))
    }

    /// Check a fed tensor against the placeholder's declaration.
    pub(crate) fn check_feed(&self, name: &str, fed: &Tensor) -> Result<(), GosgraphError> {
        let declared = self
            .tensor_map
            .get(name)
            .ok_or_else(|| TensorNotFound(name.to_string()))?;
        if declared.tensor_type() != fed.tensor_type() {
            return Err(InvalidType {
                expected: declared.tensor_type().as_str().into(),
                found: fed.tensor_type().as_str().into(),
            });
        }
        let expected = declared.shape();
        let found = fed.shape();
        let compatible = expected.len() == found.len()
            && expected
                .iter()
                .zip(found.iter())
                .all(|(e, f)| *e == -1 || e == f);
        if !compatible {
            return Err(IncompatibleShape {
                msg: format!("Fed value of `{}` has the wrong shape", name),
                expected,
                found,
            });
        }
        let len = fed.to_f64_vec().map(|v| v.len()).unwrap_or(0);
        check_len(len, &found, fed.tensor_type().as_str())
    }
}

pub(crate) fn terminal_ops(op_map: &HashMap<String, Op>) -> Vec<String> {
    let mut terminals = op_map
        .values()
        .filter(|o| o.nexts.is_empty())
        .map(|o| o.op_name.clone())
        .collect::<Vec<String>>();
    terminals.sort();
    terminals
}

fn topo_helper(op_map: &HashMap<String, Op>, sorted: &mut Vec<String>, root: &String) {
    // skip visited node
    if sorted.contains(root) {
        return;
    }

    if let Some(op) = op_map.get(root) {
        for o in &op.prevs {
            topo_helper(op_map, sorted, o);
        }
        sorted.push(root.clone())
    }
}

pub fn topo(op_map: &HashMap<String, Op>) -> Vec<String> {
    let mut sorted: Vec<String> = vec![];
    for t in terminal_ops(op_map) {
        topo_helper(op_map, &mut sorted, &t);
    }
    sorted
}

/// Topological order of the ops `fetch` depends on.
pub(crate) fn topo_for(graph: &Graph, fetch: &str) -> Vec<String> {
    let mut sorted: Vec<String> = vec![];
    if let Some(op) = graph.producer_of(fetch) {
        topo_helper(&graph.op_map, &mut sorted, &op.op_name);
    }
    sorted
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn placeholder_is_registered() -> Result<(), GosgraphError> {
        let mut graph = Graph::new();
        let x = graph.placeholder_f32("x", vec![3, 4, 5])?;
        assert_eq!(x, "x");
        assert!(graph.is_placeholder("x"));
        assert_eq!(graph.tensor_map["x"].shape(), vec![3, 4, 5]);
        assert!(!graph.tensor_map["x"].has_values());
        Ok(())
    }

    #[test]
    fn duplicate_placeholder_rejected() {
        let mut graph = Graph::new();
        graph.placeholder_f32("x", vec![1]).unwrap();
        assert!(matches!(
            graph.placeholder_f32("x", vec![1]),
            Err(DuplicateName(_))
        ));
    }

    #[test]
    fn invalid_placeholder_dims_rejected() {
        let mut graph = Graph::new();
        assert!(matches!(
            graph.placeholder_f32("x", vec![2, -3]),
            Err(TensorCreateError(_))
        ));
    }

    #[test]
    fn tensor_len_must_match_shape() {
        let mut graph = Graph::new();
        assert!(graph
            .new_tensor_f32("c", Some(vec![1.0, 2.0]), vec![3])
            .is_err());
        assert!(graph.new_tensor_f32("c", Some(vec![1.0]), vec![]).is_ok());
        assert!(Tensor::from_f64(vec![1.0; 6], vec![2, 3]).is_ok());
        assert!(Tensor::from_f64(vec![1.0; 6], vec![-1, 3]).is_err());
    }

    #[test]
    fn l2_loss_output_is_scalar_of_input_type() -> Result<(), GosgraphError> {
        let mut graph = Graph::new();
        let x = graph.placeholder_f64("x", vec![2, 2])?;
        let out = graph.l2_loss(&x)?;
        let t = &graph.tensor_map[&out];
        assert_eq!(t.shape(), Vec::<i64>::new());
        assert_eq!(t.tensor_type(), TensorType::F64);
        assert_eq!(graph.producer_of(&out).unwrap().inputs, vec!["x"]);
        Ok(())
    }

    #[test]
    fn l2_loss_of_unknown_tensor() {
        let mut graph = Graph::new();
        assert!(matches!(graph.l2_loss("nope"), Err(TensorNotFound(_))));
    }

    #[test]
    fn ops_take_the_scoped_device() -> Result<(), GosgraphError> {
        let mut graph = Graph::new();
        let x = graph.placeholder_f32("x", vec![1])?;
        let on_cpu = graph.l2_loss(&x)?;
        let on_gpu = graph.with_device(Device::Gpu, |g| g.l2_loss(&x))?;
        assert_eq!(graph.producer_of(&on_cpu).unwrap().device, Device::Cpu);
        assert_eq!(graph.producer_of(&on_gpu).unwrap().device, Device::Gpu);
        Ok(())
    }

    #[test]
    fn chained_ops_are_connected_and_sorted() -> Result<(), GosgraphError> {
        let mut graph = Graph::new();
        graph.placeholder_f32("x", vec![3])?;
        let first = graph.l2_loss("x")?;
        let second = graph.l2_loss(&first)?;
        let first_op = graph.producer_of(&first).unwrap().op_name.clone();
        let second_op = graph.producer_of(&second).unwrap().op_name.clone();

        assert_eq!(graph.op_map[&first_op].nexts, vec![second_op.clone()]);
        assert_eq!(graph.op_map[&second_op].prevs, vec![first_op.clone()]);
        assert_eq!(topo(&graph.op_map), vec![first_op.clone(), second_op]);
        assert_eq!(topo_for(&graph, &first), vec![first_op]);
        Ok(())
    }

    #[test]
    fn feed_checks() -> Result<(), GosgraphError> {
        let mut graph = Graph::new();
        graph.placeholder_f32("x", vec![-1, 2])?;
        graph.check_feed("x", &Tensor::from_f32(vec![0.0; 6], vec![3, 2])?)?;
        assert!(matches!(
            graph.check_feed("x", &Tensor::from_f32(vec![0.0; 6], vec![2, 3])?),
            Err(IncompatibleShape { .. })
        ));
        assert!(matches!(
            graph.check_feed("x", &Tensor::from_f64(vec![0.0; 2], vec![1, 2])?),
            Err(InvalidType { .. })
        ));
        Ok(())
    }

    #[test]
    fn nan_tensor_is_filled() -> Result<(), GosgraphError> {
        let t = Tensor::nan(TensorType::F32, vec![])?;
        let v = t.scalar_value().unwrap();
        assert!(v.is_nan());
        assert_eq!(Tensor::nan(TensorType::F64, vec![2, 3])?.to_f64_vec().unwrap().len(), 6);
        Ok(())
    }

    #[test]
    fn huge_shapes_are_rejected() {
        assert!(matches!(
            Tensor::from_f32(vec![], vec![i64::MAX, 2]),
            Err(TensorCreateError(_))
        ));
        assert!(matches!(
            Tensor::nan(TensorType::F32, vec![i64::MAX, 2]),
            Err(TensorCreateError(_))
        ));
        // fits in usize, not in memory
        assert!(matches!(
            Tensor::nan(TensorType::F64, vec![1 << 62]),
            Err(TensorCreateError(_))
        ));
        let mut graph = Graph::new();
        assert!(matches!(
            graph.new_tensor_f64("c", Some(vec![]), vec![i64::MAX, i64::MAX]),
            Err(TensorCreateError(_))
        ));
    }
}
