//! Compute environment: adapter selection, device, queue and kernel registry.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::config::EnvironmentConfig;
use crate::image::DEVICE_FORMAT;
use crate::kernel::{KERNELS, KernelSignature, PARAM_BLOCK_SIZE};
use crate::profiling::Profiler;
use crate::shaders;
use crate::{XformError, XformResult};

/// Texture usages a device must support on [`DEVICE_FORMAT`] to run the kernels.
const IMAGE_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// A compiled kernel and the uniform its extra arguments are bound through.
///
/// The uniform is rewritten on every invocation, so a kernel is shared
/// mutable state and only touched under the invocation lock.
pub(crate) struct Kernel {
    pub(crate) signature: &'static KernelSignature,
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) params: wgpu::Buffer,
}

/// Short description of one adapter, for listing.
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub index: usize,
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub image_support: bool,
}

impl fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({:?}, {:?}){}",
            self.index,
            self.name,
            self.backend,
            self.device_type,
            if self.image_support { "" } else { " - no image support" }
        )
    }
}

/// Enumerate the adapters `config` would choose from, in index order.
pub fn adapters(config: &EnvironmentConfig) -> Vec<AdapterSummary> {
    let instance = create_instance(config);
    instance
        .enumerate_adapters(config.backends)
        .into_iter()
        .enumerate()
        .map(|(index, adapter)| {
            let info = adapter.get_info();
            AdapterSummary {
                index,
                name: info.name,
                backend: info.backend,
                device_type: info.device_type,
                image_support: check_image_support(&adapter).is_ok(),
            }
        })
        .collect()
}

/// GPU device, queue and the compiled transform kernels.
///
/// Built once; every kernel is compiled and resolved during construction
/// or construction fails. Afterwards the environment only changes the
/// per-kernel argument uniforms, serialised by an internal lock, so it can
/// be shared across threads.
pub struct Environment {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) limits: wgpu::Limits,
    pub(crate) kernels: HashMap<&'static str, Kernel>,
    pub(crate) layout: wgpu::BindGroupLayout,
    pub(crate) sampler: wgpu::Sampler,
    pub(crate) profiler: Option<Profiler>,
    /// Held from argument upload through readback, and around every
    /// error-scoped allocation since scopes are per device.
    pub(crate) invocation: Mutex<()>,
    adapter_info: wgpu::AdapterInfo,
    // Dropped last so device-level objects never outlive the instance.
    _instance: wgpu::Instance,
}

impl Environment {
    /// Create with default configuration: first adapter, all backends.
    pub fn new() -> XformResult<Self> {
        Self::with_config(EnvironmentConfig::default())
    }

    /// Create with an explicit configuration.
    pub fn with_config(config: EnvironmentConfig) -> XformResult<Self> {
        pollster::block_on(Self::new_async(config))
    }

    async fn new_async(config: EnvironmentConfig) -> XformResult<Self> {
        let instance = create_instance(&config);

        let adapters = instance.enumerate_adapters(config.backends);
        for (i, adapter) in adapters.iter().enumerate() {
            let info = adapter.get_info();
            debug!(index = i, name = %info.name, backend = ?info.backend, "adapter");
        }

        let found = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or_else(|| {
                XformError::DeviceUnsupported(format!(
                    "no adapter at index {} ({} found for {:?})",
                    config.adapter_index, found, config.backends
                ))
            })?;

        check_image_support(&adapter)?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();

        let mut required_features = wgpu::Features::empty();
        if config.profiling && adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            required_features |= wgpu::Features::TIMESTAMP_QUERY;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(config.label.as_str()),
                    required_features,
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| XformError::DeviceCreation(e.to_string()))?;

        let layout = create_bind_group_layout(&device);
        let kernels = build_kernels(&device, &layout, shaders::TRANSFORM_KERNELS).await?;
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("xform_bilinear_clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let profiler = Profiler::new(&device, &queue);

        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            kernels = kernels.len(),
            profiling = profiler.is_some(),
            "compute environment ready"
        );

        Ok(Self {
            device,
            queue,
            limits,
            kernels,
            layout,
            sampler,
            profiler,
            invocation: Mutex::new(()),
            adapter_info,
            _instance: instance,
        })
    }

    /// Adapter info (GPU name, vendor, backend).
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Device name.
    pub fn device_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Largest width or height an image may have.
    pub fn max_image_dimension(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    /// Largest device buffer, which bounds destination readback.
    pub fn max_buffer_size(&self) -> u64 {
        self.limits.max_buffer_size
    }

    /// Whether kernel passes are timed.
    pub fn is_profiling(&self) -> bool {
        self.profiler.is_some()
    }

    /// Names of the registered kernels.
    pub fn kernel_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kernels.keys().copied()
    }

    pub(crate) fn kernel(&self, name: &str) -> XformResult<&Kernel> {
        self.kernels
            .get(name)
            .ok_or_else(|| XformError::UnknownKernel(name.to_string()))
    }

    /// Capture validation and out-of-memory errors until [`Self::pop_scopes`].
    pub(crate) fn push_scopes(&self) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    }

    /// Pop both scopes, out-of-memory first. Exhaustion maps to
    /// [`XformError::AllocationFailed`], anything else through `otherwise`.
    pub(crate) fn pop_scopes(
        &self,
        otherwise: impl FnOnce(String) -> XformError,
    ) -> XformResult<()> {
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        match oom.or(validation) {
            Some(err) => Err(scope_error(err, otherwise)),
            None => Ok(()),
        }
    }
}

/// Classify an error captured by a scope.
fn scope_error(
    err: wgpu::Error,
    otherwise: impl FnOnce(String) -> XformError,
) -> XformError {
    match err {
        wgpu::Error::OutOfMemory { .. } => XformError::AllocationFailed(err.to_string()),
        other => otherwise(other.to_string()),
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("device", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("kernels", &self.kernels.len())
            .field("profiling", &self.profiler.is_some())
            .finish()
    }
}

fn create_instance(config: &EnvironmentConfig) -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: config.backends,
        ..Default::default()
    })
}

/// The adapter must sample, store and copy RGBA8 textures with linear filtering.
fn check_image_support(adapter: &wgpu::Adapter) -> XformResult<()> {
    let features = adapter.get_texture_format_features(DEVICE_FORMAT);
    if !features.allowed_usages.contains(IMAGE_USAGES) {
        return Err(XformError::DeviceUnsupported(format!(
            "{} cannot use {:?} as {:?}",
            adapter.get_info().name,
            DEVICE_FORMAT,
            IMAGE_USAGES.difference(features.allowed_usages)
        )));
    }
    if !features.flags.contains(wgpu::TextureFormatFeatureFlags::FILTERABLE) {
        return Err(XformError::DeviceUnsupported(format!(
            "{} cannot filter {:?}",
            adapter.get_info().name,
            DEVICE_FORMAT
        )));
    }
    Ok(())
}

/// `src`, `dst`, `bilinear`, `params`: shared by every kernel.
fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("xform_kernel_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: DEVICE_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(PARAM_BLOCK_SIZE),
                },
                count: None,
            },
        ],
    })
}

/// Compile `source` once and resolve every entry point in [`KERNELS`].
async fn build_kernels(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    source: &str,
) -> XformResult<HashMap<&'static str, Kernel>> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("xform_kernels"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let compilation = module.get_compilation_info().await;
    let scope_error = device.pop_error_scope().await;

    let mut log: Vec<String> = compilation
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| m.message.clone())
        .collect();
    if let Some(err) = scope_error {
        log.push(err.to_string());
    }
    if !log.is_empty() {
        return Err(XformError::BuildFailure {
            kernel: None,
            log: log.join("\n"),
        });
    }

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("xform_kernel_pipeline_layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    let mut kernels = HashMap::with_capacity(KERNELS.len());
    for signature in &KERNELS {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(signature.name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(signature.name),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = device.pop_error_scope().await {
            return Err(XformError::BuildFailure {
                kernel: Some(signature.name),
                log: err.to_string(),
            });
        }

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(signature.name),
            size: PARAM_BLOCK_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        debug!(kernel = signature.name, nearest = signature.nearest, "kernel resolved");
        kernels.insert(
            signature.name,
            Kernel {
                signature,
                pipeline,
                params,
            },
        );
    }

    Ok(kernels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_usages_cover_both_roles() {
        assert!(IMAGE_USAGES.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(IMAGE_USAGES.contains(wgpu::TextureUsages::STORAGE_BINDING));
    }

    #[test]
    fn test_adapter_summary_display() {
        let summary = AdapterSummary {
            index: 1,
            name: "Test GPU".into(),
            backend: wgpu::Backend::Vulkan,
            device_type: wgpu::DeviceType::DiscreteGpu,
            image_support: false,
        };
        let s = summary.to_string();
        assert!(s.starts_with("[1] Test GPU"));
        assert!(s.ends_with("no image support"));
    }

    #[test]
    fn test_missing_adapter_index() {
        let config = EnvironmentConfig::default()
            .with_backends(wgpu::Backends::all())
            .with_adapter(usize::MAX);
        match Environment::with_config(config) {
            Err(XformError::DeviceUnsupported(msg)) => assert!(msg.contains("no adapter")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("adapter index usize::MAX resolved"),
        }
    }

    #[test]
    fn test_scope_error_classification() {
        let oom = wgpu::Error::OutOfMemory {
            source: Box::new(std::io::Error::other("heap exhausted")),
        };
        assert!(matches!(
            scope_error(oom, XformError::DispatchFailed),
            XformError::AllocationFailed(_)
        ));

        let invalid = wgpu::Error::Validation {
            source: Box::new(std::io::Error::other("bad binding")),
            description: "bad binding".into(),
        };
        match scope_error(invalid, XformError::DispatchFailed) {
            XformError::DispatchFailed(msg) => assert!(msg.contains("bad binding")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_entry_point_names_kernel() {
        let Ok(env) = Environment::new() else {
            println!("No compute adapter, skipping");
            return;
        };
        let source =
            shaders::TRANSFORM_KERNELS.replace("fn image_affine2(", "fn image_affine2_off(");
        let result = pollster::block_on(build_kernels(&env.device, &env.layout, &source));
        match result {
            Err(XformError::BuildFailure { kernel, log }) => {
                println!("build log: {log}");
                assert_eq!(kernel, Some(crate::kernel::AFFINE2));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("library without image_affine2 resolved"),
        }
    }

    #[test]
    fn test_broken_source_reports_log() {
        let Ok(env) = Environment::new() else {
            println!("No compute adapter, skipping");
            return;
        };
        let source = format!("{}\nfn broken( {{", shaders::TRANSFORM_KERNELS);
        let result = pollster::block_on(build_kernels(&env.device, &env.layout, &source));
        match result {
            Err(XformError::BuildFailure { kernel, log }) => {
                println!("build log: {log}");
                assert_eq!(kernel, None);
                assert!(!log.trim().is_empty());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("malformed library compiled"),
        }
    }

    #[test]
    fn test_shipped_library_builds() {
        let Ok(env) = Environment::new() else {
            println!("No compute adapter, skipping");
            return;
        };
        let kernels =
            pollster::block_on(build_kernels(&env.device, &env.layout, shaders::TRANSFORM_KERNELS))
                .unwrap();
        assert_eq!(kernels.len(), KERNELS.len());
    }
}
