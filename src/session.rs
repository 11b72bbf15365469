use std::collections::HashMap;

use crate::cache::{signature, Executable, ExecutableCache, Kernel};
use crate::config::SessionConfig;
use crate::device::Device;
use crate::errors::GosgraphError;
use crate::errors::GosgraphError::{MissingFeed, NotAPlaceholder, TensorCreateError, TensorNotFound};
use crate::executor::{CpuExecutor, Executor};
use crate::gpu::{compile_kernel, GPUExecutor};
use crate::graph::{topo_for, Graph, Op, Tensor};

/// Placeholder name to fed value. `None` feeds the placeholder with no
/// value, which materializes as NaN.
pub type FeedDict<'a> = HashMap<&'a str, Option<Tensor>>;

pub struct Session<'g> {
    graph: &'g Graph,
    config: SessionConfig,
    cpu: CpuExecutor,
    gpu: Option<GPUExecutor>,
    cache: ExecutableCache,
}

impl<'g> Session<'g> {
    pub fn new(graph: &'g Graph, config: SessionConfig) -> Result<Self, GosgraphError> {
        config.validate()?;
        log::debug!("opening session with {:?}", config);
        Ok(Self {
            graph,
            cache: ExecutableCache::new(config.cache_depth),
            config,
            cpu: CpuExecutor::new(),
            gpu: None,
        })
    }

    /// Open a session, hand it to `f` and close it on every exit path.
    pub fn with<T, F>(graph: &'g Graph, config: SessionConfig, f: F) -> Result<T, GosgraphError>
    where
        F: FnOnce(&mut Session<'g>) -> Result<T, GosgraphError>,
    {
        let mut session = Session::new(graph, config)?;
        f(&mut session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cache(&self) -> &ExecutableCache {
        &self.cache
    }

    /// Evaluate `fetch` with the placeholders bound to `feeds`.
    pub fn run(&mut self, fetch: &str, feeds: &FeedDict) -> Result<Tensor, GosgraphError> {
        let graph = self.graph;
        if !graph.tensor_map.contains_key(fetch) {
            return Err(TensorNotFound(fetch.to_string()));
        }
        let bound = self.bind_feeds(feeds)?;
        if let Some(t) = bound.get(fetch) {
            return Ok(t.clone());
        }
        if graph.is_placeholder(fetch) {
            return Err(MissingFeed(fetch.to_string()));
        }

        let sig = signature(fetch, &bound);
        let executable = match self.cache.get(&sig) {
            Some(exe) => exe.clone(),
            None => {
                let exe = self.compile(fetch, &bound)?;
                self.cache.insert(sig, exe.clone());
                exe
            }
        };

        let mut values = bound;
        for op_name in &executable.order {
            let op = &graph.op_map[op_name];
            let kernel = executable
                .kernels
                .get(op_name)
                .ok_or_else(|| GosgraphError::OpNotFound(op_name.clone()))?;
            let outputs = {
                let inputs = resolve_inputs(graph, op, &values)?;
                let executor = self.executor_for(op)?;
                log::trace!("running `{}` on {}", op.op_name, executor.device());
                executor.execute_op(op, kernel, &inputs)?
            };
            for (name, t) in op.outputs.iter().zip(outputs.into_iter()) {
                values.insert(name.clone(), t);
            }
        }

        if let Some(t) = values.remove(fetch) {
            return Ok(t);
        }
        match graph.tensor_map.get(fetch) {
            Some(t) if t.has_values() => Ok(t.clone()),
            _ => Err(TensorCreateError(format!(
                "`{}` was not produced by any op",
                fetch
            ))),
        }
    }

    fn bind_feeds(&self, feeds: &FeedDict) -> Result<HashMap<String, Tensor>, GosgraphError> {
        let mut bound = HashMap::new();
        for (name, value) in feeds {
            if !self.graph.tensor_map.contains_key(*name) {
                return Err(TensorNotFound(name.to_string()));
            }
            if !self.graph.is_placeholder(name) {
                return Err(NotAPlaceholder(name.to_string()));
            }
            let tensor = match value {
                Some(t) => {
                    self.graph.check_feed(name, t)?;
                    t.clone()
                }
                None => {
                    let declared = &self.graph.tensor_map[*name];
                    let shape = declared.shape();
                    if shape.iter().any(|d| *d < 0) {
                        return Err(TensorCreateError(format!(
                            "`{}` has unknown dims {:?} and cannot be fed with no value",
                            name, shape
                        )));
                    }
                    Tensor::nan(declared.tensor_type(), shape)?
                }
            };
            bound.insert(name.to_string(), tensor);
        }
        Ok(bound)
    }

    fn placement(&self, op: &Op) -> Device {
        self.config.device_override.unwrap_or(op.device)
    }

    fn compile(
        &self,
        fetch: &str,
        bound: &HashMap<String, Tensor>,
    ) -> Result<Executable, GosgraphError> {
        let order = topo_for(self.graph, fetch);
        let mut kernels = HashMap::new();
        // intermediates only need their shape and type to be compiled against
        let mut shapes: HashMap<String, Tensor> = bound.clone();
        for op_name in &order {
            let op = &self.graph.op_map[op_name];
            let inputs = resolve_inputs(self.graph, op, &shapes)?;
            let kernel = match self.placement(op) {
                Device::Cpu => Kernel::Host,
                Device::Gpu => compile_kernel(op, &inputs)?,
            };
            let output_shapes = op.op_type.as_compile().output_shapes(op, &inputs);
            for (name, shape) in op.outputs.iter().zip(output_shapes.into_iter()) {
                let declared = &self.graph.tensor_map[name];
                shapes.insert(name.clone(), Tensor::nan(declared.tensor_type(), shape)?);
            }
            log::debug!("compiled `{}` for {}", op_name, self.placement(op));
            kernels.insert(op_name.clone(), kernel);
        }
        Ok(Executable { order, kernels })
    }

    fn executor_for(&mut self, op: &Op) -> Result<&mut dyn Executor, GosgraphError> {
        match self.placement(op) {
            Device::Cpu => Ok(&mut self.cpu),
            Device::Gpu => {
                if self.gpu.is_none() {
                    self.gpu = Some(GPUExecutor::new(self.config.pipeline_depth)?);
                }
                match self.gpu.as_mut() {
                    Some(gpu) => Ok(gpu),
                    None => Err(GosgraphError::AdapterUnavailable),
                }
            }
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        log::debug!(
            "closing session ({} cached, {} hits, {} misses)",
            self.cache.len(),
            self.cache.hits(),
            self.cache.misses()
        );
    }
}

/// Input tensors of `op`: fed or computed values first, then constants
/// declared in the graph.
fn resolve_inputs<'a>(
    graph: &'a Graph,
    op: &Op,
    values: &'a HashMap<String, Tensor>,
) -> Result<Vec<&'a Tensor>, GosgraphError> {
    op.inputs
        .iter()
        .map(|name| {
            if let Some(t) = values.get(name) {
                return Ok(t);
            }
            if graph.is_placeholder(name) {
                return Err(MissingFeed(name.clone()));
            }
            match graph.tensor_map.get(name) {
                Some(t) if t.has_values() => Ok(t),
                Some(_) => Err(TensorCreateError(format!("`{}` holds no values", name))),
                None => Err(TensorNotFound(name.clone())),
            }
        })
        .collect()
}
