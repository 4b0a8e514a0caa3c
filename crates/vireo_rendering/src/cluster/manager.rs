//! Cluster manager.
//!
//! Orchestrates global cluster storage, per-viewport instance storage, the
//! per-frame buffer lifecycle, active-instance collection, and the draw
//! dispatch - one per viewport per frame.
//!
//! ## Frame-indexed retention
//!
//! Uploads are fire-and-forget; nothing waits for the GPU. Instead, every
//! buffer produced for a frame is also stored in a table indexed by the
//! frame-in-flight slot. The clone kept there holds the allocation alive
//! for any draw still reading it, and is dropped - releasing the previous
//! generation - only when a later frame revisits the same slot.
//!
//! ## Locking
//!
//! `add_geometry` and `add_model` may be called from loader threads;
//! `render` runs on the render thread. All of them take the same state
//! lock, so array mutation can never overlap a frame's upload pass.
//! Per-instance transform/enabled state deliberately lives outside that
//! lock (see [`super::instance::ModelInstance`]).

use std::mem::size_of;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};
use vireo_core::SlotPool;

use super::instance::ModelInstance;
use super::template::GeometryTemplate;
use super::{
    ClusterGpu, ClusterInstanceGpu, GeometryDescriptor, ModelDataGpu, ModelDescriptor,
    PushConstants, Vertex,
};
use crate::context::{PipelineId, RenderContext, ViewportId};
use crate::gpu::packet::{DrawMeshTasks, RenderPacket};
use crate::gpu::{BufferUsage, GpuAllocError, GpuAllocator, GpuBuffer};
use crate::lod::{self, LodSettings};
use crate::stats::{RenderStats, StatsGpu};

/// Binding index of the global cluster array.
pub const BINDING_CLUSTERS: u32 = 0;
/// Binding index of the viewport's cluster-instance array.
pub const BINDING_INSTANCES: u32 = 1;
/// Binding index of the model-record array.
pub const BINDING_MODEL_DATA: u32 = 2;
/// Binding index of the stats buffer. Binding 3 is reserved in the
/// pipeline layout for the pass's output image and is never bound here.
pub const BINDING_STATS: u32 = 4;
/// Binding index of the active-instance list.
pub const BINDING_ACTIVE_INSTANCES: u32 = 5;

/// Construction parameters for [`ClusterManager`].
pub struct ClusterManagerInfo {
    /// Backend the manager allocates every buffer through.
    pub allocator: Box<dyn GpuAllocator>,
    /// Pipeline the submission backend draws packets with.
    pub pipeline: PipelineId,
    /// Initial LOD selection settings.
    pub lod: LodSettings,
}

/// Per-viewport CPU state and buffer generations.
#[derive(Default)]
struct ViewportState {
    /// Cluster-instance records, appended by `add_model`.
    instances: Vec<ClusterInstanceGpu>,
    /// Set when `instances` is stale relative to the GPU copy.
    dirty: bool,
    /// Current instance-array generation.
    instance_buffer: Option<GpuBuffer>,
    /// Retained generation per frame-in-flight slot.
    instance_buffer_per_frame: Vec<Option<GpuBuffer>>,
    /// One stats staging buffer per frame-in-flight slot.
    stats_buffer_per_frame: Vec<Option<GpuBuffer>>,
}

struct ManagerState {
    /// Append-only global cluster array. Records are never mutated or
    /// removed after `add_geometry` returns; the array never shrinks.
    clusters: Vec<ClusterGpu>,
    clusters_dirty: bool,
    templates: SlotPool<GeometryTemplate>,
    models: SlotPool<ModelInstance>,
    /// Flat table indexed by `ViewportId`.
    viewports: Vec<ViewportState>,
    /// Current cluster-array generation.
    cluster_buffer: Option<GpuBuffer>,
    cluster_buffer_per_frame: Vec<Option<GpuBuffer>>,
    /// Current model-record staging generation, sized by
    /// `models.required_storage_count()`.
    model_data_buffer: Option<GpuBuffer>,
    model_data_per_frame: Vec<Option<GpuBuffer>>,
    stats: RenderStats,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            clusters: Vec::new(),
            clusters_dirty: false,
            templates: SlotPool::new(),
            models: SlotPool::new(),
            viewports: Vec::new(),
            cluster_buffer: None,
            cluster_buffer_per_frame: Vec::new(),
            model_data_buffer: None,
            model_data_per_frame: Vec::new(),
            stats: RenderStats::default(),
        }
    }
}

/// The virtualized-geometry renderer.
pub struct ClusterManager {
    state: Mutex<ManagerState>,
    allocator: Mutex<Box<dyn GpuAllocator>>,
    pipeline: PipelineId,
    lod: RwLock<LodSettings>,
}

/// Allocation failure in this subsystem is fatal by design: there is no
/// degraded-quality fallback, so escalate with the backend's diagnostic.
fn must_allocate(result: Result<GpuBuffer, GpuAllocError>, what: &str) -> GpuBuffer {
    result.unwrap_or_else(|err| panic!("fatal: failed to allocate {what}: {err}"))
}

impl ClusterManager {
    /// Creates a manager. The `Arc` is required so model instances can hold
    /// a weak back-reference for [`ModelInstance::duplicate`].
    #[must_use]
    pub fn new(info: ClusterManagerInfo) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ManagerState::new()),
            allocator: Mutex::new(info.allocator),
            pipeline: info.pipeline,
            lod: RwLock::new(info.lod),
        })
    }

    /// Appends a batch of meshlets as a new immutable geometry template.
    ///
    /// Appends one cluster record per meshlet to the global array, repacks
    /// the meshlets' vertices and indices into two new tightly-packed
    /// device buffers sized exactly to this template, and stamps each
    /// cluster with its device addresses. Marks the cluster array dirty.
    ///
    /// Calling this with an empty meshlet list is a contract violation:
    /// cluster loading is an authoring-time operation, not a runtime user
    /// action.
    pub fn add_geometry(&self, desc: &GeometryDescriptor<'_>) -> Arc<GeometryTemplate> {
        assert!(
            !desc.meshlets.is_empty(),
            "cannot add a geometry batch with zero meshlets"
        );

        let mut state = self.state.lock();
        let first_cluster = state.clusters.len() as u32;

        // Repack vertices and meshlet-local indices tightly, in submission
        // order. No de-duplication across templates.
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        for meshlet in desc.meshlets {
            let vertex_window =
                meshlet.vertex_offset as usize..(meshlet.vertex_offset + meshlet.vertex_count) as usize;
            for &source_index in &desc.meshlet_vertex_indices[vertex_window] {
                vertices.push(desc.vertices[source_index as usize]);
            }
            let index_window =
                meshlet.index_offset as usize..(meshlet.index_offset + meshlet.index_count) as usize;
            indices.extend_from_slice(&desc.meshlet_indices[index_window]);

            state.clusters.push(ClusterGpu {
                transform: desc.transform,
                bounding_sphere: meshlet.bounding_sphere,
                parent_bounding_sphere: meshlet.parent_bounding_sphere,
                // Addresses are stamped below, once the buffers exist.
                vertex_address: 0,
                index_address: 0,
                error: meshlet.error,
                parent_error: meshlet.parent_error,
                lod: meshlet.lod,
                triangle_count: meshlet.index_count / 3,
                vertex_count: meshlet.vertex_count,
                _pad: [0; 3],
            });
        }

        let usage = BufferUsage::STORAGE | BufferUsage::TRANSFER_DST;
        let (vertex_buffer, index_buffer) = {
            let mut allocator = self.allocator.lock();
            let vertex_buffer = must_allocate(
                allocator
                    .allocate_device_buffer((vertices.len() * size_of::<Vertex>()) as u64, usage),
                "template vertex buffer",
            );
            let index_buffer = must_allocate(
                allocator.allocate_device_buffer((indices.len() * size_of::<u32>()) as u64, usage),
                "template index buffer",
            );
            (vertex_buffer, index_buffer)
        };
        vertex_buffer.stage_upload(&vertices);
        index_buffer.stage_upload(&indices);

        // Device addresses accumulate per-meshlet byte counts in submission
        // order.
        let mut vertex_offset = 0u64;
        let mut index_offset = 0u64;
        for (i, meshlet) in desc.meshlets.iter().enumerate() {
            let cluster = &mut state.clusters[first_cluster as usize + i];
            cluster.vertex_address = vertex_buffer.device_address() + vertex_offset;
            cluster.index_address = index_buffer.device_address() + index_offset;
            vertex_offset += u64::from(meshlet.vertex_count) * size_of::<Vertex>() as u64;
            index_offset += u64::from(meshlet.index_count) * size_of::<u32>() as u64;
        }

        state.clusters_dirty = true;
        debug!(
            meshlets = desc.meshlets.len(),
            first_cluster, "appended geometry batch"
        );

        let cluster_count = desc.meshlets.len() as u32;
        state.templates.create_with(|slot| {
            GeometryTemplate::new(slot, first_cluster, cluster_count, vertex_buffer, index_buffer)
        })
    }

    /// Places templates into a viewport's draw set as one model instance.
    ///
    /// Reserves a contiguous range at the end of the viewport's
    /// cluster-instance array, writes one record per (template, cluster)
    /// pair, then back-fills every record with the new instance's slot.
    /// Marks the viewport's instance array dirty.
    ///
    /// Template and material lists must have equal length; anything else
    /// is a contract violation.
    pub fn add_model(self: &Arc<Self>, desc: &ModelDescriptor<'_>) -> Arc<ModelInstance> {
        assert_eq!(
            desc.templates.len(),
            desc.materials.len(),
            "one material handle per template required"
        );

        let instance_count: u32 = desc
            .templates
            .iter()
            .map(|template| template.cluster_count())
            .sum();

        let mut state = self.state.lock();
        let viewport = desc.viewport;
        if state.viewports.len() <= viewport.index() {
            state
                .viewports
                .resize_with(viewport.index() + 1, ViewportState::default);
        }

        let viewport_state = &mut state.viewports[viewport.index()];
        viewport_state.dirty = true;
        let first_instance = viewport_state.instances.len() as u32;

        for (template, material) in desc.templates.iter().zip(desc.materials) {
            for cluster_id in template.cluster_range() {
                viewport_state.instances.push(ClusterInstanceGpu {
                    cluster_id,
                    material_index: material.index(),
                    instance_data_index: 0,
                    _pad: 0,
                });
            }
        }

        let model = state.models.create_with(|slot| {
            ModelInstance::new(
                slot,
                Arc::downgrade(self),
                desc.templates.to_vec(),
                desc.materials.to_vec(),
                viewport,
                first_instance,
                instance_count,
            )
        });

        // Every record of the new range points back at the model's slot,
        // where the dispatch fetches transform and visibility.
        let slot = model.slot();
        let viewport_state = &mut state.viewports[viewport.index()];
        let range = first_instance as usize..(first_instance + instance_count) as usize;
        for record in &mut viewport_state.instances[range] {
            record.instance_data_index = slot;
        }

        debug!(
            slot,
            first_instance, instance_count, "added model instance"
        );
        model
    }

    /// Reclaims slots of templates and models whose last strong handle was
    /// dropped. Must run exactly once per frame, before any `render` call
    /// of that frame - never mid-frame.
    pub fn begin_frame(&self) {
        let mut state = self.state.lock();
        let purged_templates = state.templates.purge_expired();
        let purged_models = state.models.purge_expired();
        if purged_templates + purged_models > 0 {
            trace!(purged_templates, purged_models, "purged expired slots");
        }
    }

    /// Builds this frame's draw submission for one viewport.
    ///
    /// Re-uploads whatever is dirty, writes the per-model records, collects
    /// the active-instance list, retains every buffer under the frame's
    /// in-flight slot, and returns the packet carrying one mesh-task
    /// dispatch sized by the active-instance count. Returns `None` when
    /// the viewport has nothing to draw.
    pub fn render(&self, ctx: &RenderContext) -> Option<RenderPacket> {
        let frames = ctx.frames_in_flight.max(1) as usize;
        assert!(
            (ctx.frame_index as usize) < frames,
            "frame index {} out of range for {} frames in flight",
            ctx.frame_index,
            frames
        );
        let frame = ctx.frame_index as usize;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.clusters.is_empty() {
            return None;
        }
        let viewport_state = state.viewports.get_mut(ctx.viewport_id.index())?;
        if viewport_state.instances.is_empty() {
            return None;
        }

        // Retention tables follow the swapchain's frame-in-flight count.
        state.cluster_buffer_per_frame.resize(frames, None);
        state.model_data_per_frame.resize(frames, None);
        viewport_state.instance_buffer_per_frame.resize(frames, None);
        viewport_state.stats_buffer_per_frame.resize(frames, None);

        let mut allocator = self.allocator.lock();

        // Step 1: global cluster array, wholesale, when dirty. The previous
        // generation stays alive through the per-frame table until every
        // in-flight frame that bound it has been revisited.
        if state.clusters_dirty {
            let byte_size = (state.clusters.len() * size_of::<ClusterGpu>()) as u64;
            let buffer = must_allocate(
                allocator.allocate_device_buffer(
                    byte_size,
                    BufferUsage::STORAGE | BufferUsage::TRANSFER_DST,
                ),
                "global cluster array",
            );
            buffer.stage_upload(&state.clusters);
            debug!(
                clusters = state.clusters.len(),
                bytes = byte_size,
                "re-uploaded global cluster array"
            );
            state.cluster_buffer = Some(buffer);
            state.clusters_dirty = false;
        }

        // Step 2: this viewport's instance array when dirty.
        if viewport_state.dirty {
            let byte_size =
                (viewport_state.instances.len() * size_of::<ClusterInstanceGpu>()) as u64;
            let buffer = must_allocate(
                allocator.allocate_device_buffer(
                    byte_size,
                    BufferUsage::STORAGE | BufferUsage::TRANSFER_DST,
                ),
                "cluster instance array",
            );
            buffer.stage_upload(&viewport_state.instances);
            debug!(
                viewport = ctx.viewport_id.index(),
                instances = viewport_state.instances.len(),
                "re-uploaded cluster instance array"
            );
            viewport_state.instance_buffer = Some(buffer);
            viewport_state.dirty = false;
        }

        // Model-record staging sized by the pool's storage bound, which
        // covers dead-but-unpurged slots in-flight frames may still index.
        // Grown whenever the bound outgrows the current allocation.
        let required_model_bytes =
            (state.models.required_storage_count() * size_of::<ModelDataGpu>()) as u64;
        let model_data_stale = state
            .model_data_buffer
            .as_ref()
            .map_or(true, |buffer| buffer.byte_len() < required_model_bytes);
        if model_data_stale {
            state.model_data_buffer = Some(must_allocate(
                allocator.allocate_staging_buffer(required_model_bytes),
                "model record staging buffer",
            ));
        }

        // Step 3: write every live model's record; collect this viewport's
        // active instances. Disabled models keep their slot record but
        // contribute nothing to the active list.
        let model_data_buffer = state
            .model_data_buffer
            .clone()
            .expect("model record buffer exists once any model was added");
        let mut active_instances: Vec<u32> = Vec::new();
        model_data_buffer.with_mapped::<ModelDataGpu, _>(|records| {
            for (slot, weak) in state.models.iter() {
                let Some(model) = weak.upgrade() else {
                    continue;
                };
                let enabled = model.is_enabled();
                let record = &mut records[slot as usize];
                record.transform = model.transform();
                record.visible = u32::from(enabled);
                if enabled && model.viewport() == ctx.viewport_id {
                    active_instances.extend(model.instance_range());
                }
            }
        });

        // Step 4: single-frame transient buffer for the active list.
        let active_buffer = must_allocate(
            allocator
                .allocate_transient_buffer((active_instances.len() * size_of::<u32>()) as u64),
            "active instance list",
        );
        active_buffer.stage_upload(&active_instances);

        // Stats staging, one per viewport per frame slot: read back and
        // reset whatever the previous use of this slot accumulated.
        if viewport_state.stats_buffer_per_frame[frame].is_none() {
            viewport_state.stats_buffer_per_frame[frame] = Some(must_allocate(
                allocator.allocate_staging_buffer(size_of::<StatsGpu>() as u64),
                "stats buffer",
            ));
        }
        drop(allocator);
        let stats_buffer = viewport_state.stats_buffer_per_frame[frame]
            .clone()
            .expect("allocated above");
        let mut triangles = 0u64;
        stats_buffer.with_mapped::<StatsGpu, _>(|records| {
            triangles = u64::from(records[0].total_triangle_count);
            records[0].total_triangle_count = 0;
        });

        // Step 7: retain this frame's generations under the in-flight slot.
        // Whatever the slot previously held is dropped here - the only
        // point where an old generation can be released.
        state.cluster_buffer_per_frame[frame] = state.cluster_buffer.clone();
        state.model_data_per_frame[frame] = state.model_data_buffer.clone();
        viewport_state.instance_buffer_per_frame[frame] = viewport_state.instance_buffer.clone();

        // Steps 5-6: bindings, constants, one dispatch sized by the active
        // list. The cut decision itself runs in the mesh stage.
        let cluster_buffer = state
            .cluster_buffer
            .clone()
            .expect("cluster buffer exists once the cluster array is non-empty");
        let instance_buffer = viewport_state
            .instance_buffer
            .clone()
            .expect("instance buffer exists once the instance array is non-empty");

        let mut packet = RenderPacket {
            pipeline: self.pipeline,
            viewport: ctx.viewport_id,
            bindings: Vec::new(),
            push_constants: Vec::new(),
            draw: DrawMeshTasks {
                group_count_x: active_instances.len() as u32,
                group_count_y: 1,
                group_count_z: 1,
            },
        };
        packet.bind_buffer(0, BINDING_CLUSTERS, cluster_buffer);
        packet.bind_buffer(0, BINDING_INSTANCES, instance_buffer);
        packet.bind_buffer(0, BINDING_MODEL_DATA, model_data_buffer);
        packet.bind_buffer(0, BINDING_STATS, stats_buffer);
        packet.bind_buffer(0, BINDING_ACTIVE_INSTANCES, active_buffer);

        let lod_settings = *self.lod.read();
        packet.set_push_constants(&PushConstants {
            instance_bound: viewport_state.instances.len() as u32,
            lod_mode: lod_settings.mode.as_u32(),
            error_threshold: lod_settings.error_threshold,
            forced_lod: lod_settings.forced_lod,
            screen_height: ctx.viewport.height_pixels(),
            _pad: [0; 3],
        });

        state.stats = RenderStats {
            active_instances: active_instances.len() as u32,
            live_models: state.models.live_count() as u32,
            live_templates: state.templates.live_count() as u32,
            total_clusters: state.clusters.len() as u32,
            triangles,
        };

        Some(packet)
    }

    /// Evaluates the cut test on the CPU for every active (instance,
    /// cluster) pair of a viewport, mirroring what the mesh stage does.
    ///
    /// Returns the selected cluster-instance indices, sorted. Backs the
    /// debug overlay and the test suite; the draw itself never calls this.
    #[must_use]
    pub fn selected_clusters(&self, ctx: &RenderContext) -> Vec<u32> {
        let state = self.state.lock();
        let lod_settings = *self.lod.read();
        let Some(viewport_state) = state.viewports.get(ctx.viewport_id.index()) else {
            return Vec::new();
        };

        let mut selected = Vec::new();
        for (_, weak) in state.models.iter() {
            let Some(model) = weak.upgrade() else {
                continue;
            };
            if model.viewport() != ctx.viewport_id || !model.is_enabled() {
                continue;
            }
            let transform = model.transform();
            for instance_index in model.instance_range() {
                let record = &viewport_state.instances[instance_index as usize];
                let cluster = &state.clusters[record.cluster_id as usize];
                if lod::cluster_cut_test(
                    cluster,
                    &transform,
                    &ctx.camera.view,
                    ctx.viewport.height_pixels(),
                    &lod_settings,
                ) {
                    selected.push(instance_index);
                }
            }
        }
        selected.sort_unstable();
        selected
    }

    /// Returns the current LOD selection settings.
    #[must_use]
    pub fn lod_settings(&self) -> LodSettings {
        *self.lod.read()
    }

    /// Replaces the LOD selection settings (operator/debug override).
    pub fn set_lod_settings(&self, settings: LodSettings) {
        *self.lod.write() = settings;
    }

    /// Statistics from the most recent `render` call.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.state.lock().stats
    }

    /// Size of the append-only global cluster array.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.state.lock().clusters.len()
    }

    /// Size of one viewport's cluster-instance array.
    #[must_use]
    pub fn instance_count(&self, viewport: ViewportId) -> usize {
        self.state
            .lock()
            .viewports
            .get(viewport.index())
            .map_or(0, |state| state.instances.len())
    }

    /// Number of model slots GPU parallel arrays must cover, including
    /// dead-but-unpurged slots.
    #[must_use]
    pub fn required_model_slots(&self) -> usize {
        self.state.lock().models.required_storage_count()
    }

    /// Number of currently live model instances.
    #[must_use]
    pub fn live_model_count(&self) -> usize {
        self.state.lock().models.live_count()
    }
}
