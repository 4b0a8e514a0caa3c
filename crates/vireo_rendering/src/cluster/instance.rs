//! Model instances.
//!
//! A model instance is one concrete placement of one or more geometry
//! templates into one viewport's draw set. It owns an immutable
//! contiguous range of that viewport's cluster-instance array, plus the
//! mutable per-placement state (transform, enabled flag) that gameplay
//! threads poke without taking the manager lock.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use glam::Mat4;
use parking_lot::RwLock;

use super::manager::ClusterManager;
use super::template::GeometryTemplate;
use super::{MaterialId, ModelDescriptor};
use crate::context::ViewportId;

/// One placement of geometry templates in a viewport.
pub struct ModelInstance {
    slot: u32,
    manager: Weak<ClusterManager>,
    templates: Vec<Arc<GeometryTemplate>>,
    materials: Vec<MaterialId>,
    viewport: ViewportId,
    first_instance: u32,
    instance_count: u32,
    enabled: AtomicBool,
    transform: RwLock<Mat4>,
}

impl ModelInstance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        slot: u32,
        manager: Weak<ClusterManager>,
        templates: Vec<Arc<GeometryTemplate>>,
        materials: Vec<MaterialId>,
        viewport: ViewportId,
        first_instance: u32,
        instance_count: u32,
    ) -> Self {
        Self {
            slot,
            manager,
            templates,
            materials,
            viewport,
            first_instance,
            instance_count,
            enabled: AtomicBool::new(true),
            transform: RwLock::new(Mat4::IDENTITY),
        }
    }

    /// Slot of this instance in the manager's model pool. Cluster-instance
    /// records point back here via `instance_data_index`.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Viewport this instance draws into.
    #[inline]
    #[must_use]
    pub const fn viewport(&self) -> ViewportId {
        self.viewport
    }

    /// First entry of this instance's range in the viewport's
    /// cluster-instance array. Fixed at creation.
    #[inline]
    #[must_use]
    pub const fn first_instance(&self) -> u32 {
        self.first_instance
    }

    /// Number of cluster-instance entries owned by this instance - the sum
    /// of cluster counts over its templates. Fixed at creation.
    #[inline]
    #[must_use]
    pub const fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// This instance's contiguous range in the viewport's array.
    #[must_use]
    pub const fn instance_range(&self) -> Range<u32> {
        self.first_instance..self.first_instance + self.instance_count
    }

    /// Templates referenced by this instance.
    #[must_use]
    pub fn templates(&self) -> &[Arc<GeometryTemplate>] {
        &self.templates
    }

    /// Whether this instance contributes to the draw set.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables this instance. Disabled instances keep their
    /// array range but contribute nothing to the active-instance list.
    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns the model-to-world transform.
    #[inline]
    #[must_use]
    pub fn transform(&self) -> Mat4 {
        *self.transform.read()
    }

    /// Sets the model-to-world transform.
    #[inline]
    pub fn set_transform(&self, transform: Mat4) {
        *self.transform.write() = transform;
    }

    /// Creates a second instance sharing this one's templates and
    /// materials, with an independently allocated instance range.
    ///
    /// No geometry is re-uploaded; only the new cluster-instance records
    /// are written. Dropping the original never invalidates the duplicate.
    /// Calling this after the owning manager was dropped is a contract
    /// violation.
    #[must_use]
    pub fn duplicate(&self) -> Arc<ModelInstance> {
        let manager = self
            .manager
            .upgrade()
            .expect("duplicated a model instance after its manager was dropped");
        manager.add_model(&ModelDescriptor {
            viewport: self.viewport,
            templates: &self.templates,
            materials: &self.materials,
        })
    }
}
