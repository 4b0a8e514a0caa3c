//! Draw submission data.
//!
//! `ClusterManager::render` returns everything the submission backend
//! needs as plain data - no closures over GPU state. The backend binds the
//! listed buffers, pushes the constant block, and records one mesh-task
//! dispatch.

use bytemuck::Pod;

use super::GpuBuffer;
use crate::context::{PipelineId, ViewportId};

/// One buffer bound to the draw pipeline.
#[derive(Debug, Clone)]
pub struct BufferBinding {
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// The buffer to bind.
    pub buffer: GpuBuffer,
}

/// Mesh-shading dispatch dimensions.
///
/// `group_count_x` is the active-instance count; the per-(instance,
/// cluster) LOD cut decision happens inside the dispatch, not on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawMeshTasks {
    /// Task groups along X - one per active cluster instance.
    pub group_count_x: u32,
    /// Task groups along Y.
    pub group_count_y: u32,
    /// Task groups along Z.
    pub group_count_z: u32,
}

/// A complete draw submission for one viewport, one frame.
#[derive(Debug, Clone)]
pub struct RenderPacket {
    /// Pipeline to draw with.
    pub pipeline: PipelineId,
    /// Viewport this packet belongs to.
    pub viewport: ViewportId,
    /// Buffers to bind before dispatch.
    pub bindings: Vec<BufferBinding>,
    /// Raw push-constant bytes for the mesh stage.
    pub push_constants: Vec<u8>,
    /// The single mesh-task dispatch.
    pub draw: DrawMeshTasks,
}

impl RenderPacket {
    /// Appends a buffer binding.
    pub fn bind_buffer(&mut self, set: u32, binding: u32, buffer: GpuBuffer) {
        self.bindings.push(BufferBinding {
            set,
            binding,
            buffer,
        });
    }

    /// Sets the push-constant block from a Pod value.
    pub fn set_push_constants<T: Pod>(&mut self, data: &T) {
        self.push_constants = bytemuck::bytes_of(data).to_vec();
    }

    /// Returns the binding at `(set, binding)`, if present.
    #[must_use]
    pub fn binding(&self, set: u32, binding: u32) -> Option<&GpuBuffer> {
        self.bindings
            .iter()
            .find(|entry| entry.set == set && entry.binding == binding)
            .map(|entry| &entry.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{BufferUsage, GpuAllocator, HostAllocator};

    #[test]
    fn test_binding_lookup() {
        let mut alloc = HostAllocator::new();
        let buffer = alloc
            .allocate_device_buffer(4, BufferUsage::STORAGE)
            .unwrap();
        let mut packet = RenderPacket {
            pipeline: PipelineId::new(0),
            viewport: ViewportId::new(0),
            bindings: Vec::new(),
            push_constants: Vec::new(),
            draw: DrawMeshTasks {
                group_count_x: 0,
                group_count_y: 1,
                group_count_z: 1,
            },
        };
        packet.bind_buffer(0, 3, buffer.clone());
        assert_eq!(
            packet.binding(0, 3).map(GpuBuffer::device_address),
            Some(buffer.device_address())
        );
        assert!(packet.binding(0, 0).is_none());
    }
}
