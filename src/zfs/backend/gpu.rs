//! Double-precision GPU contraction backend built on `wgpu`.
//!
//! The dipolar kernel table and half-space weights are uploaded once per run. For every pair the
//! squared magnitudes $`|\rho_{ij}(\mathbf{G})|^2`$ are uploaded, each workgroup reduces a
//! grid-strided share of the $`\mathbf{G}`$-vectors into six partial sums with a fixed tree
//! order, and the partial sums are added on the CPU in workgroup order.

use std::sync::Mutex;

use bytemuck::{cast_slice, Pod, Zeroable};
use log;
use pollster::block_on;
use wgpu::util::DeviceExt;

use crate::auxiliary::grid::GridFingerprint;
use crate::target::tensor::SymmetricTensor;
use crate::zfs::backend::{BackendKind, ContractionBackend};
use crate::zfs::dipole_kernel::DipoleKernel;
use crate::zfs::pair_density::PairDensity;
use crate::zfs::reducer::SumMode;
use crate::zfs::ZfsError;

/// The number of threads per workgroup. Must match the shader.
const WORKGROUP_SIZE: u32 = 128;

/// The largest number of workgroups dispatched per contraction.
const MAX_WORKGROUPS: u32 = 4096;

const CONTRACTION_WGSL: &str = r"
struct Params {
    n: u32,
    use_weights: u32,
    n_groups: u32,
    _pad: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> kernel: array<f64>;
@group(0) @binding(2) var<storage, read> weights: array<f64>;
@group(0) @binding(3) var<storage, read> density: array<f64>;
@group(0) @binding(4) var<storage, read_write> partials: array<f64>;

var<workgroup> scratch: array<f64, 768>;

@compute @workgroup_size(128)
fn main(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
) {
    let t = lid.x;
    let stride = params.n_groups * 128u;

    var acc: array<f64, 6>;
    for (var k = wid.x * 128u + t; k < params.n; k += stride) {
        var m = density[k];
        if (params.use_weights != 0u) {
            m = m * weights[k];
        }
        for (var c = 0u; c < 6u; c++) {
            acc[c] = acc[c] + m * kernel[k * 6u + c];
        }
    }
    for (var c = 0u; c < 6u; c++) {
        scratch[t * 6u + c] = acc[c];
    }
    workgroupBarrier();

    for (var s = 64u; s > 0u; s = s >> 1u) {
        if (t < s) {
            for (var c = 0u; c < 6u; c++) {
                scratch[t * 6u + c] = scratch[t * 6u + c] + scratch[(t + s) * 6u + c];
            }
        }
        workgroupBarrier();
    }

    if (t == 0u) {
        for (var c = 0u; c < 6u; c++) {
            partials[wid.x * 6u + c] = scratch[c];
        }
    }
}
";

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ParamsPod {
    n: u32,
    use_weights: u32,
    n_groups: u32,
    _pad: u32,
}

/// Device-resident copies of a dipolar kernel.
struct KernelBuffers {
    fingerprint: GridFingerprint,
    n: usize,
    table: wgpu::Buffer,
    weights: wgpu::Buffer,
}

/// A contraction backend running on a GPU adapter with `SHADER_F64` support.
pub struct GpuBackend {
    /// The name of the adapter in use.
    adapter_name: String,

    /// The index of the adapter among the compatible adapters.
    adapter_index: usize,

    device: wgpu::Device,

    queue: wgpu::Queue,

    pipeline: wgpu::ComputePipeline,

    /// The kernel uploaded by [`ContractionBackend::prepare`].
    kernel_buffers: Mutex<Option<KernelBuffers>>,
}

impl GpuBackend {
    /// Creates a GPU backend for the process with the given rank.
    ///
    /// Processes are spread over the compatible adapters in round-robin order, so that rank $`r`$
    /// uses adapter $`r \bmod n_{\mathrm{adapters}}`$.
    ///
    /// # Errors
    ///
    /// Returns the reason as a string if no adapter supports `SHADER_F64`, if the device cannot be
    /// acquired, or if the contraction shader fails to compile.
    pub fn new(rank: usize) -> Result<Self, String> {
        let instance = wgpu::Instance::default();
        let adapters = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .filter(|adapter| adapter.features().contains(wgpu::Features::SHADER_F64))
            .collect::<Vec<_>>();
        if adapters.is_empty() {
            return Err("no GPU adapter with double-precision shader support was found".to_string());
        }
        let adapter_index = rank % adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(adapter_index)
            .ok_or_else(|| format!("adapter {adapter_index} could not be retrieved"))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("qzfs.gpu.device"),
                required_features: wgpu::Features::SHADER_F64,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|err| format!("unable to acquire a device on {adapter_name}: {err}"))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("qzfs.gpu.contraction"),
            source: wgpu::ShaderSource::Wgsl(CONTRACTION_WGSL.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("qzfs.gpu.pipeline"),
            layout: None,
            module: &shader,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = block_on(device.pop_error_scope()) {
            return Err(format!("the contraction shader could not be built: {err}"));
        }

        Ok(Self {
            adapter_name,
            adapter_index,
            device,
            queue,
            pipeline,
            kernel_buffers: Mutex::new(None),
        })
    }

    fn upload_kernel(&self, kernel: &DipoleKernel) -> Result<KernelBuffers, ZfsError> {
        let table = kernel.table().as_slice().ok_or_else(|| {
            ZfsError::Backend("The dipolar kernel table is not contiguous.".to_string())
        })?;
        let table = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("qzfs.gpu.kernel"),
                contents: cast_slice(table),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let weights = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("qzfs.gpu.weights"),
                contents: cast_slice(kernel.weights()),
                usage: wgpu::BufferUsages::STORAGE,
            });
        log::debug!(
            "Dipolar kernel uploaded to {} ({:.3} MiB).",
            self.adapter_name,
            kernel.n_bytes() as f64 / 1024.0 / 1024.0
        );
        Ok(KernelBuffers {
            fingerprint: kernel.fingerprint().clone(),
            n: kernel.len(),
            table,
            weights,
        })
    }

    fn read_partials(&self, staging: &wgpu::Buffer) -> Result<Vec<f64>, ZfsError> {
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| ZfsError::Backend("GPU map callback was dropped.".to_string()))?
            .map_err(|err| ZfsError::Backend(format!("GPU buffer mapping failed: {err}")))?;
        let data = slice.get_mapped_range();
        let partials = cast_slice::<u8, f64>(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(partials)
    }
}

impl ContractionBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn description(&self) -> String {
        format!("GPU [{}] {}", self.adapter_index, self.adapter_name)
    }

    fn prepare(&self, kernel: &DipoleKernel) -> Result<(), ZfsError> {
        let buffers = self.upload_kernel(kernel)?;
        let mut guard = self
            .kernel_buffers
            .lock()
            .map_err(|_| ZfsError::Backend("GPU kernel cache is poisoned.".to_string()))?;
        *guard = Some(buffers);
        Ok(())
    }

    fn contract(
        &self,
        density: &PairDensity,
        kernel: &DipoleKernel,
        mode: SumMode,
    ) -> Result<SymmetricTensor, ZfsError> {
        kernel.check_compatible(density.fingerprint())?;
        let n = density.len();

        let mut guard = self
            .kernel_buffers
            .lock()
            .map_err(|_| ZfsError::Backend("GPU kernel cache is poisoned.".to_string()))?;
        let stale = guard
            .as_ref()
            .map(|buffers| !buffers.fingerprint.is_compatible(kernel.fingerprint()))
            .unwrap_or(true);
        if stale {
            *guard = Some(self.upload_kernel(kernel)?);
        }
        let buffers = guard
            .as_ref()
            .ok_or_else(|| ZfsError::Backend("No dipolar kernel on the device.".to_string()))?;
        if buffers.n != n {
            return Err(ZfsError::configuration(format!(
                "The pair density has {n} values, but the dipolar kernel covers {} G-vectors.",
                buffers.n
            )));
        }

        let magnitudes = density
            .values()
            .iter()
            .map(|x| x.norm_sqr())
            .collect::<Vec<f64>>();
        let n_groups = ((n as u32 + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE).clamp(1, MAX_WORKGROUPS);
        let params = ParamsPod {
            n: n as u32,
            use_weights: u32::from(mode == SumMode::HalfSpace),
            n_groups,
            _pad: 0,
        };
        let partials_size = (n_groups as usize * 6 * std::mem::size_of::<f64>()) as u64;

        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("qzfs.gpu.params"),
                contents: cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let density_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("qzfs.gpu.density"),
                contents: cast_slice(&magnitudes),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let partials_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("qzfs.gpu.partials"),
            size: partials_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("qzfs.gpu.staging"),
            size: partials_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = self.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("qzfs.gpu.bind_group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.table.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.weights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: density_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: partials_buffer.as_entire_binding(),
                },
            ],
        });
        drop(guard);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("qzfs.gpu.encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("qzfs.gpu.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(n_groups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&partials_buffer, 0, &staging, 0, partials_size);
        self.queue.submit(Some(encoder.finish()));

        let partials = self.read_partials(&staging)?;
        let total = partials
            .chunks_exact(6)
            .map(|chunk| SymmetricTensor::new([chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5]]))
            .sum();
        Ok(total)
    }
}
