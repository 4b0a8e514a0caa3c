//! Per-frame render context.
//!
//! The surrounding frame loop owns cameras, viewports and swapchain
//! pacing; the cluster renderer only reads them. Viewports are identified
//! by a stable small integer indexing flat per-viewport tables - never by
//! pointer.

use glam::Mat4;

/// Stable identity of a viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ViewportId(u32);

impl ViewportId {
    /// Creates a viewport id.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the flat-table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque identity of a draw pipeline owned by the submission backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PipelineId(u32);

impl PipelineId {
    /// Creates a pipeline id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Pixel dimensions of the render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Viewport height in pixels as the float the projection math wants.
    #[inline]
    #[must_use]
    pub fn height_pixels(&self) -> f32 {
        self.height as f32
    }
}

/// Camera state for the frame being rendered.
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip matrix.
    pub projection: Mat4,
}

impl CameraState {
    /// Creates a camera state from view and projection matrices.
    #[must_use]
    pub const fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Wraps a view matrix with an identity projection. The cut test only
    /// reads the view matrix, so this suffices for headless selection.
    #[must_use]
    pub const fn from_view(view: Mat4) -> Self {
        Self {
            view,
            projection: Mat4::IDENTITY,
        }
    }

    /// Returns the world-to-view matrix.
    #[inline]
    #[must_use]
    pub const fn view(&self) -> Mat4 {
        self.view
    }

    /// Returns the view-to-clip matrix.
    #[inline]
    #[must_use]
    pub const fn projection(&self) -> Mat4 {
        self.projection
    }
}

/// Everything `render` reads from the surrounding frame loop.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    /// Current camera.
    pub camera: CameraState,
    /// Viewport being rendered.
    pub viewport_id: ViewportId,
    /// Pixel dimensions of that viewport.
    pub viewport: Viewport,
    /// Frame-in-flight slot for this frame. Buffers retained under this
    /// index are safe to release only when the slot is revisited.
    pub frame_index: u32,
    /// Number of frame-in-flight slots the swapchain rotates through.
    pub frames_in_flight: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_id_indexes_flat_tables() {
        assert_eq!(ViewportId::new(3).index(), 3);
    }

    #[test]
    fn test_camera_state_exposes_both_matrices() {
        let view = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -5.0));
        let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0);
        let camera = CameraState::new(view, projection);
        assert_eq!(camera.view(), view);
        assert_eq!(camera.projection(), projection);

        assert_eq!(CameraState::from_view(view).projection(), Mat4::IDENTITY);
    }

    #[test]
    fn test_viewport_height_pixels() {
        let viewport = Viewport {
            width: 1920,
            height: 1080,
        };
        assert!((viewport.height_pixels() - 1080.0).abs() < f32::EPSILON);
    }
}
