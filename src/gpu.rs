use std::borrow::Cow;

use include_dir::{include_dir, Dir};
use naga::FastHashMap;
use wgpu::util::DeviceExt;

use crate::cache::Kernel;
use crate::device::Device;
use crate::errors::GosgraphError;
use crate::errors::GosgraphError::{
    AdapterUnavailable, BufferReadError, DeviceRequestError, InvalidType, ShaderCompileError,
    SlotsExhausted, TensorCreateError,
};
use crate::executor::Executor;
use crate::graph::{Op, Tensor};
use crate::index_library::IndexLibrary;
use crate::ops::{OpType, ShaderTemplate};
use crate::utils::numel;

static SHADER_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/shader");

/// Load the GLSL template registered for `op_type`.
pub fn shader_template(op_type: &OpType) -> Result<ShaderTemplate, GosgraphError> {
    let name = op_type.to_string();
    let source = SHADER_DIR
        .get_file(format!("{}.glsl", name))
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| ShaderCompileError(format!("No shader template for `{}`", name)))?;
    ShaderTemplate::new(&name, source)
}

/// Render the shader of `op` for the given inputs.
pub fn compile_kernel(op: &Op, inputs: &[&Tensor]) -> Result<Kernel, GosgraphError> {
    let compile = op.op_type.as_compile();
    let mut templ = shader_template(&op.op_type)?;
    compile.compile(op, &mut templ, inputs)?;
    Ok(Kernel::Shader {
        source: templ.render()?,
        workgroups: compile.compute_workgroup_size(op, inputs),
    })
}

fn byte_size(n_items: usize) -> u64 {
    // bindings and copies need at least one 4-byte element
    (n_items.max(1) * std::mem::size_of::<f32>()) as u64
}

fn create_storage_buf(device: &wgpu::Device, buf_label: &str, values: &[f32]) -> wgpu::Buffer {
    let vals: Cow<'_, [f32]> = if values.is_empty() {
        Cow::Owned(vec![0.0])
    } else {
        Cow::Borrowed(values)
    };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(format!("{}.storage", buf_label).as_str()),
        contents: bytemuck::cast_slice::<f32, u8>(&vals),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
    })
}

fn create_staging_buf(device: &wgpu::Device, buf_label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(format!("{}.staging", buf_label).as_str()),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub struct GPUExecutor {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    slots: IndexLibrary,
    staging_pool: Vec<Option<wgpu::Buffer>>,
}

impl GPUExecutor {
    pub fn new(pipeline_depth: usize) -> Result<Self, GosgraphError> {
        pollster::block_on(Self::new_async(pipeline_depth))
    }

    async fn new_async(pipeline_depth: usize) -> Result<Self, GosgraphError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(AdapterUnavailable)?;
        let info = adapter.get_info();
        let compute = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
        if !compute || adapter.limits().max_storage_buffers_per_shader_stage < 2 {
            log::warn!("gpu: adapter `{}` cannot run compute shaders", info.name);
            return Err(AdapterUnavailable);
        }
        log::info!("gpu: using adapter `{}` ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gosgraph"),
                    features: wgpu::Features::empty(),
                    limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|e| DeviceRequestError(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            slots: IndexLibrary::new(pipeline_depth),
            staging_pool: (0..pipeline_depth).map(|_| None).collect(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn create_pipeline(
        &self,
        shader_source: &str,
        op: &Op,
        n_bindings: usize,
    ) -> Result<(wgpu::ComputePipeline, wgpu::BindGroupLayout), GosgraphError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("shader_{}", op.op_type)),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Borrowed(shader_source),
                    stage: naga::ShaderStage::Compute,
                    defines: FastHashMap::default(),
                },
            });

        let bindgroup_layout_entries = (0..n_bindings)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(4),
                },
                count: None,
            })
            .collect::<Vec<wgpu::BindGroupLayoutEntry>>();
        let bindgroup_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("bindgroup_layout_{}", op.op_type)),
                    entries: bindgroup_layout_entries.as_slice(),
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("pipeline_layout_{}", op.op_type)),
                bind_group_layouts: &[&bindgroup_layout],
                push_constant_ranges: &[],
            });
        let compute_pipeline =
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&format!("compute_pipeline_{}", op.op_type)),
                    layout: Some(&pipeline_layout),
                    module: &shader_module,
                    entry_point: "main",
                });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderCompileError(err.to_string()));
        }
        Ok((compute_pipeline, bindgroup_layout))
    }

    fn ensure_staging_buf(&mut self, slot: usize, label: &str, size: u64) {
        let reusable = matches!(&self.staging_pool[slot], Some(buf) if buf.size() >= size);
        if !reusable {
            log::trace!("gpu: allocating staging slot {} ({} bytes)", slot, size);
            self.staging_pool[slot] = Some(create_staging_buf(&self.device, label, size));
        }
    }

    async fn read_back(
        &self,
        staging: &wgpu::Buffer,
        size: u64,
        n_items: usize,
    ) -> Result<Vec<f32>, GosgraphError> {
        let buffer_slice = staging.slice(..size);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.receive().await {
            Some(Ok(())) => {
                let data = buffer_slice.get_mapped_range();
                let values = bytemuck::try_cast_slice::<u8, f32>(&data)
                    .map(|v| v[..n_items].to_vec())
                    .map_err(|e| BufferReadError(format!("{:?}", e)));
                drop(data);
                staging.unmap();
                values
            }
            Some(Err(e)) => Err(BufferReadError(e.to_string())),
            None => Err(BufferReadError("map callback dropped".into())),
        }
    }

    fn run_shader(
        &mut self,
        op: &Op,
        source: &str,
        workgroups: &[u32; 3],
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, GosgraphError> {
        let mut input_bufs = vec![];
        for (name, input) in op.inputs.iter().zip(inputs.iter()) {
            match input {
                Tensor::F32 {
                    values: Some(v), ..
                } => input_bufs.push(create_storage_buf(&self.device, name, v)),
                Tensor::F32 { values: None, .. } => {
                    return Err(TensorCreateError(format!(
                        "Input `{}` of `{}` holds no values",
                        name, op.op_name
                    )))
                }
                other => {
                    return Err(InvalidType {
                        expected: "f32".into(),
                        found: other.tensor_type().as_str().into(),
                    })
                }
            }
        }

        let output_shapes = op.op_type.as_compile().output_shapes(op, inputs);
        let output_bufs = op
            .outputs
            .iter()
            .zip(output_shapes.iter())
            .map(|(name, shape)| Ok(create_storage_buf(&self.device, name, &vec![0.0; numel(shape)?])))
            .collect::<Result<Vec<wgpu::Buffer>, GosgraphError>>()?;

        let (pipeline, bindgroup_layout) =
            self.create_pipeline(source, op, input_bufs.len() + output_bufs.len())?;
        let bindgroup_entries = input_bufs
            .iter()
            .chain(output_bufs.iter())
            .enumerate()
            .map(|(binding, buf)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buf.as_entire_binding(),
            })
            .collect::<Vec<wgpu::BindGroupEntry>>();
        let bindgroup = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("bindgroup_{}", op.op_type)),
            layout: &bindgroup_layout,
            entries: bindgroup_entries.as_slice(),
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&op.op_name),
                ..Default::default()
            });
            cpass.set_pipeline(&pipeline);
            cpass.set_bind_group(0, &bindgroup, &[]);
            cpass.insert_debug_marker(&op.op_name);
            cpass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }
        self.queue.submit(Some(encoder.finish()));
        log::trace!("gpu: dispatched `{}` {:?}", op.op_name, workgroups);

        let mut outputs = vec![];
        for ((name, shape), output_buf) in op
            .outputs
            .iter()
            .zip(output_shapes.into_iter())
            .zip(output_bufs.iter())
        {
            let slot = self.slots.get_index().ok_or(SlotsExhausted)?;
            let len = numel(&shape)?;
            let result = self.copy_out(slot, name, output_buf, len);
            self.slots.return_index(slot)?;
            outputs.push(Tensor::F32 {
                values: Some(result?),
                shape,
            });
        }
        Ok(outputs)
    }

    fn copy_out(
        &mut self,
        slot: usize,
        name: &str,
        output_buf: &wgpu::Buffer,
        n_items: usize,
    ) -> Result<Vec<f32>, GosgraphError> {
        let size = byte_size(n_items);
        self.ensure_staging_buf(slot, name, size);
        let staging = self.staging_pool[slot]
            .as_ref()
            .ok_or_else(|| BufferReadError(format!("staging slot {} is empty", slot)))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        // Copy from GPU to CPU
        encoder.copy_buffer_to_buffer(output_buf, 0, staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        pollster::block_on(self.read_back(staging, size, n_items))
    }
}

impl Executor for GPUExecutor {
    fn device(&self) -> Device {
        Device::Gpu
    }

    fn execute_op(
        &mut self,
        op: &Op,
        kernel: &Kernel,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, GosgraphError> {
        match kernel {
            Kernel::Shader { source, workgroups } => self.run_shader(op, source, workgroups, inputs),
            Kernel::Host => Err(GosgraphError::Error(format!(
                "Op `{}` was compiled for the host",
                op.op_name
            ))),
        }
    }
}
