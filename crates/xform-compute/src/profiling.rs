//! Kernel timing via timestamp queries.
//!
//! Two timestamps bracket the compute pass. They are resolved and copied
//! into a mappable buffer in the same submission as the pixel readback.

use std::time::Duration;

const QUERY_COUNT: u32 = 2;
const QUERY_BYTES: u64 = QUERY_COUNT as u64 * std::mem::size_of::<u64>() as u64;

pub(crate) struct Profiler {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    /// Nanoseconds per timestamp tick.
    period: f32,
}

impl Profiler {
    /// `None` unless the device was created with `TIMESTAMP_QUERY`.
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Option<Self> {
        if !device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return None;
        }

        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("xform_kernel_timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("xform_timestamp_resolve"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Some(Self {
            query_set,
            resolve,
            period: queue.get_timestamp_period(),
        })
    }

    pub(crate) fn pass_writes(&self) -> wgpu::ComputePassTimestampWrites<'_> {
        wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    /// Record the resolve and return the staging buffer to map after submit.
    pub(crate) fn resolve(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
    ) -> wgpu::Buffer {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("xform_timestamp_readback"),
            size: QUERY_BYTES,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.resolve_query_set(&self.query_set, 0..QUERY_COUNT, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &staging, 0, QUERY_BYTES);
        staging
    }

    pub(crate) fn elapsed(&self, raw: &[u8]) -> Option<Duration> {
        ticks_to_duration(raw, self.period)
    }
}

fn ticks_to_duration(raw: &[u8], period: f32) -> Option<Duration> {
    if raw.len() < QUERY_BYTES as usize {
        return None;
    }
    let [begin, end]: [u64; 2] = bytemuck::pod_read_unaligned(&raw[..QUERY_BYTES as usize]);
    let nanos = end.checked_sub(begin)? as f64 * period as f64;
    Some(Duration::from_nanos(nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(begin: u64, end: u64) -> Vec<u8> {
        let mut v = begin.to_ne_bytes().to_vec();
        v.extend_from_slice(&end.to_ne_bytes());
        v
    }

    #[test]
    fn test_ticks_to_duration() {
        assert_eq!(ticks_to_duration(&raw(100, 1100), 1.0), Some(Duration::from_nanos(1000)));
        assert_eq!(ticks_to_duration(&raw(0, 40), 2.5), Some(Duration::from_nanos(100)));
    }

    #[test]
    fn test_ticks_out_of_order() {
        assert_eq!(ticks_to_duration(&raw(50, 10), 1.0), None);
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(ticks_to_duration(&[0u8; 8], 1.0), None);
    }
}
