//! Cluster data model.
//!
//! GPU records are `#[repr(C)]` Pod structs with explicit padding so the
//! CPU-side arrays byte-cast straight into storage-buffer uploads. Layout
//! is load-bearing: the mesh pipeline indexes these arrays by the ids
//! written here.
//!
//! The global cluster array is append-only. Once a record is appended it
//! is never mutated or removed; only whole arrays are reallocated and
//! re-uploaded when the dirty flag is set.

pub mod instance;
pub mod manager;
pub mod template;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use vireo_core::Sphere;

use crate::context::ViewportId;
use template::GeometryTemplate;

/// Index of a material in the external material system.
///
/// Materials themselves live outside this crate; only the index crosses
/// the seam, written into every [`ClusterInstanceGpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MaterialId(u32);

impl MaterialId {
    /// Creates a material id.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw material index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// One mesh vertex as stored in template vertex buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

/// One cluster record in the append-only global cluster array.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ClusterGpu {
    /// Local-to-template transform.
    pub transform: Mat4,
    /// Bounding sphere of this cluster, in template space.
    pub bounding_sphere: Sphere,
    /// Bounding sphere of this cluster's LOD parent.
    pub parent_bounding_sphere: Sphere,
    /// Device address of this cluster's vertex block.
    pub vertex_address: u64,
    /// Device address of this cluster's index block.
    pub index_address: u64,
    /// Simplification error of this cluster.
    pub error: f32,
    /// Simplification error of this cluster's LOD parent. `+inf` for
    /// hierarchy roots, so the parent condition of the cut test always
    /// holds for them.
    pub parent_error: f32,
    /// Discrete LOD level (0 = finest).
    pub lod: u32,
    /// Triangle count of this cluster.
    pub triangle_count: u32,
    /// Vertex count of this cluster.
    pub vertex_count: u32,
    /// Explicit padding to a 16-byte multiple.
    pub _pad: [u32; 3],
}

/// One entry of a viewport's cluster-instance array.
///
/// Invariant: `instance_data_index` resolves to a live model slot for as
/// long as this entry is listed in the frame's active-instance buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ClusterInstanceGpu {
    /// Index into the global cluster array.
    pub cluster_id: u32,
    /// Material index for this template within its model.
    pub material_index: u32,
    /// Slot of the owning model instance, indexing the model-record array.
    pub instance_data_index: u32,
    /// Explicit padding.
    pub _pad: u32,
}

/// Per-model-slot record the mesh pipeline reads transforms from.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ModelDataGpu {
    /// Model-to-world transform.
    pub transform: Mat4,
    /// Non-zero when the model is enabled.
    pub visible: u32,
    /// Explicit padding to a 16-byte multiple.
    pub _pad: [u32; 3],
}

impl Default for ModelDataGpu {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            visible: 0,
            _pad: [0; 3],
        }
    }
}

/// Push-constant block of the cluster draw dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct PushConstants {
    /// Size of the viewport's cluster-instance array.
    pub instance_bound: u32,
    /// LOD selection mode (see [`crate::lod::LodMode`]).
    pub lod_mode: u32,
    /// Screen-space error threshold in pixels (automatic mode).
    pub error_threshold: f32,
    /// LOD level to force (forced mode).
    pub forced_lod: u32,
    /// Viewport height in pixels, for the projection.
    pub screen_height: f32,
    /// Explicit padding.
    pub _pad: [u32; 3],
}

/// Authoring-side description of one meshlet.
///
/// Offsets name contiguous windows into the shared source mesh carried by
/// the enclosing [`GeometryDescriptor`]. Index values are meshlet-local
/// (0..`vertex_count`).
#[derive(Debug, Clone, Copy)]
pub struct MeshletDescriptor {
    /// First entry of this meshlet's window in `meshlet_vertex_indices`.
    pub vertex_offset: u32,
    /// Number of vertices referenced by this meshlet.
    pub vertex_count: u32,
    /// First entry of this meshlet's window in `meshlet_indices`.
    pub index_offset: u32,
    /// Number of indices (3 per triangle).
    pub index_count: u32,
    /// Discrete LOD level of this meshlet.
    pub lod: u32,
    /// Bounding sphere of this meshlet.
    pub bounding_sphere: Sphere,
    /// Bounding sphere of this meshlet's LOD parent.
    pub parent_bounding_sphere: Sphere,
    /// Simplification error of this meshlet.
    pub error: f32,
    /// Simplification error of the parent; `+inf` for roots.
    pub parent_error: f32,
}

/// Input to [`manager::ClusterManager::add_geometry`]: one mesh's worth of
/// meshlets, all sharing one source vertex/index pool.
#[derive(Debug, Clone, Copy)]
pub struct GeometryDescriptor<'a> {
    /// Local-to-template transform stamped into every cluster record.
    pub transform: Mat4,
    /// The meshlets to append. Must be non-empty.
    pub meshlets: &'a [MeshletDescriptor],
    /// Source mesh vertices shared by all meshlets.
    pub vertices: &'a [Vertex],
    /// Per-meshlet windows of indices into `vertices`.
    pub meshlet_vertex_indices: &'a [u32],
    /// Per-meshlet windows of meshlet-local triangle indices.
    pub meshlet_indices: &'a [u32],
}

/// Input to [`manager::ClusterManager::add_model`]: a placement of one or
/// more templates into one viewport's draw set.
#[derive(Debug, Clone)]
pub struct ModelDescriptor<'a> {
    /// Viewport this model draws into.
    pub viewport: ViewportId,
    /// Templates to instantiate, paired with `materials`.
    pub templates: &'a [Arc<GeometryTemplate>],
    /// One material per template.
    pub materials: &'a [MaterialId],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_record_sizes() {
        // The mesh pipeline declares these layouts; a size drift here is a
        // silent GPU-side corruption.
        assert_eq!(std::mem::size_of::<ClusterGpu>(), 144);
        assert_eq!(std::mem::size_of::<ClusterInstanceGpu>(), 16);
        assert_eq!(std::mem::size_of::<ModelDataGpu>(), 80);
        assert_eq!(std::mem::size_of::<PushConstants>(), 32);
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_cluster_array_casts_to_bytes() {
        let clusters = vec![ClusterGpu::zeroed(); 3];
        let bytes: &[u8] = bytemuck::cast_slice(&clusters);
        assert_eq!(bytes.len(), 3 * 144);
    }
}
