//! Kernel invocation: bind, dispatch over the destination, blocking readback.

use std::sync::{PoisonError, mpsc};

use tracing::{debug, trace};

use crate::environment::Environment;
use crate::image::{DestinationImage, SourceImage, pack_rgb, padded_row_bytes};
use crate::kernel::KernelArg;
use crate::shaders::WORKGROUP_SIZE;
use crate::{XformError, XformResult};

/// Work grid covering every destination pixel exactly once.
///
/// Workgroups are square tiles of [`WORKGROUP_SIZE`]; edge tiles overhang
/// the image and the kernels discard invocations outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    pub width: u32,
    pub height: u32,
}

impl DispatchGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Workgroup counts along x and y.
    pub fn workgroups(&self) -> (u32, u32) {
        (
            self.width.div_ceil(WORKGROUP_SIZE),
            self.height.div_ceil(WORKGROUP_SIZE),
        )
    }

    /// Invocations launched, overhang included.
    pub fn invocations(&self) -> u64 {
        let (x, y) = self.workgroups();
        x as u64 * y as u64 * (WORKGROUP_SIZE * WORKGROUP_SIZE) as u64
    }
}

impl Environment {
    /// Run `kernel` once over every pixel of `dst` and read the result back.
    ///
    /// `args` are the kernel's extra parameters, after `src` and `dst`.
    /// Blocks until the readback completes and returns the destination's
    /// packed RGB8 pixels. A destination can be the target of one
    /// invocation only.
    pub fn invoke<'d>(
        &self,
        kernel: &str,
        src: &SourceImage,
        dst: &'d mut DestinationImage,
        args: &[KernelArg],
    ) -> XformResult<&'d [u8]> {
        let kernel = self.kernel(kernel)?;
        if dst.is_read_back() {
            return Err(XformError::DestinationAlreadyRead);
        }
        let params = kernel.signature.bind(args)?;
        trace!(kernel = kernel.signature.name, ?params, "arguments bound");

        let (width, height) = dst.dimensions();
        let grid = DispatchGrid::new(width, height);
        let (groups_x, groups_y) = grid.workgroups();
        let padded_row = padded_row_bytes(width);

        let _guard = self.invocation.lock().unwrap_or_else(PoisonError::into_inner);

        self.push_scopes();

        self.queue
            .write_buffer(&kernel.params, 0, bytemuck::bytes_of(&params));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.signature.name),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&dst.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: kernel.params.as_entire_binding(),
                },
            ],
        });

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("xform_readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("xform_invoke"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.signature.name),
                timestamp_writes: self.profiler.as_ref().map(|p| p.pass_writes()),
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        // The copy is recorded after the pass in the same encoder, so it
        // observes every kernel write.
        encoder.copy_texture_to_buffer(
            dst.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            dst.texture.size(),
        );

        let timestamps = self
            .profiler
            .as_ref()
            .map(|p| p.resolve(&self.device, &mut encoder));

        let submission = self.queue.submit(std::iter::once(encoder.finish()));

        self.pop_scopes(|err| {
            XformError::DispatchFailed(format!("{}: {err}", kernel.signature.name))
        })?;

        let padded = map_read(&self.device, &readback, &submission)?;
        let kernel_time = match (&timestamps, &self.profiler) {
            (Some(buffer), Some(profiler)) => {
                let raw = map_read(&self.device, buffer, &submission)?;
                profiler.elapsed(&raw)
            }
            _ => None,
        };

        debug!(
            kernel = kernel.signature.name,
            width,
            height,
            groups_x,
            groups_y,
            ?kernel_time,
            "kernel invoked"
        );

        let pixels = pack_rgb(&padded, width, height, padded_row);
        Ok(dst.complete(pixels, kernel_time))
    }
}

/// Wait for `submission` and copy out the whole of `buffer`.
fn map_read(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    submission: &wgpu::SubmissionIndex,
) -> XformResult<Vec<u8>> {
    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission.clone()));

    rx.recv()
        .map_err(|_| XformError::ReadbackFailed("map callback dropped".into()))?
        .map_err(|e| XformError::ReadbackFailed(e.to_string()))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_exact_fit() {
        assert_eq!(DispatchGrid::new(32, 16).workgroups(), (2, 1));
    }

    #[test]
    fn test_grid_rounds_up() {
        assert_eq!(DispatchGrid::new(17, 1).workgroups(), (2, 1));
        assert_eq!(DispatchGrid::new(1, 1).workgroups(), (1, 1));
    }

    #[test]
    fn test_grid_covers_every_pixel() {
        for (w, h) in [(1, 1), (15, 33), (640, 480), (1001, 7)] {
            let grid = DispatchGrid::new(w, h);
            let (x, y) = grid.workgroups();
            assert!(x * WORKGROUP_SIZE >= w && (x - 1) * WORKGROUP_SIZE < w);
            assert!(y * WORKGROUP_SIZE >= h && (y - 1) * WORKGROUP_SIZE < h);
            assert!(grid.invocations() >= w as u64 * h as u64);
        }
    }
}
