//! # VIREO Rendering Engine
//!
//! GPU-driven virtualized geometry: mesh surfaces arrive pre-split into
//! small fixed-granularity clusters ("meshlets") organized into a
//! hierarchical LOD structure. Each frame the renderer selects - per
//! instance, per cluster - the coarsest cluster that still satisfies a
//! screen-space error bound.
//!
//! ## Architecture
//!
//! ```text
//! geometry loader ──► GeometryTemplate (once per mesh)
//!                          │
//!                          ▼
//!                     ModelInstance (once per placement)
//!                          │
//!                          ▼
//!     ClusterManager::render (every frame, per viewport)
//!        │  upload dirty cluster/instance arrays
//!        │  write model records, collect active instances
//!        ▼
//!     RenderPacket (one mesh-task dispatch per viewport)
//! ```
//!
//! The device allocator and the draw submission backend are external
//! collaborators behind the [`gpu::GpuAllocator`] trait and the
//! [`gpu::packet::RenderPacket`] data it returns; nothing in this crate
//! talks to a driver directly.

pub mod cluster;
pub mod context;
pub mod gpu;
pub mod lod;
pub mod stats;

pub use cluster::instance::ModelInstance;
pub use cluster::manager::{
    ClusterManager, ClusterManagerInfo, BINDING_ACTIVE_INSTANCES, BINDING_CLUSTERS,
    BINDING_INSTANCES, BINDING_MODEL_DATA, BINDING_STATS,
};
pub use cluster::template::GeometryTemplate;
pub use cluster::{
    ClusterGpu, ClusterInstanceGpu, GeometryDescriptor, MaterialId, MeshletDescriptor,
    ModelDataGpu, ModelDescriptor, PushConstants, Vertex,
};
pub use context::{CameraState, PipelineId, RenderContext, Viewport, ViewportId};
pub use gpu::{BufferUsage, GpuAllocError, GpuAllocator, GpuBuffer, HostAllocator};
pub use gpu::packet::{BufferBinding, DrawMeshTasks, RenderPacket};
pub use lod::{LodMode, LodSettings};
pub use stats::RenderStats;
