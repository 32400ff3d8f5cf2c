use wgpu::{Adapter, Device, Instance, Queue};

use crate::error::Result;

/// Device and queue the renderer records into.
pub struct Context {
    pub instance: Option<Instance>,
    pub adapter: Option<Adapter>,
    pub device: Device,
    pub queue: Queue,
}

impl Context {
    /// Requests an adapter and device without a surface, falling back to a
    /// software adapter when no hardware one is found. Frames are presented
    /// to an [`OffscreenTarget`](crate::OffscreenTarget) or any other
    /// [`PresentTarget`](crate::PresentTarget).
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match request_adapter(&instance, false).await {
            Ok(adapter) => adapter,
            Err(err) => {
                tracing::warn!(%err, "no hardware adapter, trying the fallback adapter");
                request_adapter(&instance, true).await?
            }
        };

        // Ordering pass: positions, covariances, colors, command, keys, indices.
        // Buffer sizes follow the adapter, not the downlevel 128 MiB binding.
        let adapter_limits = adapter.limits();
        let needed_limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: 6,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::downlevel_defaults()
        };
        let limits = needed_limits.using_resolution(adapter_limits);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Splat Device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "created headless context");

        Ok(Self {
            instance: Some(instance),
            adapter: Some(adapter),
            device,
            queue,
        })
    }

    /// Wraps a device and queue owned by the embedding application.
    pub fn from_parts(device: Device, queue: Queue) -> Self {
        Self {
            instance: None,
            adapter: None,
            device,
            queue,
        }
    }
}

async fn request_adapter(instance: &Instance, force_fallback_adapter: bool) -> Result<Adapter> {
    Ok(instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter,
        })
        .await?)
}
