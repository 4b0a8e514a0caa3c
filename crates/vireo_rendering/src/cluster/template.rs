//! Geometry templates.
//!
//! A template is an immutable, shareable batch of clusters belonging to
//! one mesh's LOD hierarchy, backed by its own tightly-packed vertex and
//! index buffers. Model instances share templates through `Arc`; the
//! manager only holds a weak reference via the slot pool, so a template
//! lives exactly as long as some instance still references it (plus the
//! purge latency of one `begin_frame`).

use std::ops::Range;

use crate::gpu::GpuBuffer;

/// An immutable batch of clusters with its backing GPU buffers.
#[derive(Debug)]
pub struct GeometryTemplate {
    slot: u32,
    first_cluster: u32,
    cluster_count: u32,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
}

impl GeometryTemplate {
    pub(crate) fn new(
        slot: u32,
        first_cluster: u32,
        cluster_count: u32,
        vertex_buffer: GpuBuffer,
        index_buffer: GpuBuffer,
    ) -> Self {
        Self {
            slot,
            first_cluster,
            cluster_count,
            vertex_buffer,
            index_buffer,
        }
    }

    /// Slot of this template in the manager's template pool.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// First cluster of this template in the global cluster array.
    #[inline]
    #[must_use]
    pub const fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// Number of clusters in this template.
    #[inline]
    #[must_use]
    pub const fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// This template's contiguous range in the global cluster array.
    #[must_use]
    pub const fn cluster_range(&self) -> Range<u32> {
        self.first_cluster..self.first_cluster + self.cluster_count
    }

    /// The vertex buffer backing this template's clusters.
    #[must_use]
    pub fn vertex_buffer(&self) -> &GpuBuffer {
        &self.vertex_buffer
    }

    /// The index buffer backing this template's clusters.
    #[must_use]
    pub fn index_buffer(&self) -> &GpuBuffer {
        &self.index_buffer
    }
}
