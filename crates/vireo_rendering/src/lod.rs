//! LOD cut selection.
//!
//! The cut test maps `(cluster, instance transform, camera, settings)` to
//! a single boolean: draw this cluster or not. In automatic mode a cluster
//! is selected when its own error projects at or below the threshold while
//! its parent's error projects above it - for a continuous threshold sweep
//! this picks exactly one cluster per branch of the hierarchy (a monotone
//! cut). The dispatch runs the same test in the mesh stage; the CPU
//! mirror here backs the debug overlay and the test suite.
//!
//! Selection is recomputed fully every frame from the current camera
//! pose; there is no hysteresis.

use glam::Mat4;
use serde::{Deserialize, Serialize};
use vireo_core::Sphere;

use crate::cluster::ClusterGpu;

/// Fixed vertical field of view the error projection assumes.
///
/// The projection deliberately uses a fixed FOV rather than the camera's
/// actual one: the threshold then means the same thing regardless of zoom,
/// and the cut never pops during FOV animation.
pub const LOD_TEST_FOV: f32 = std::f32::consts::FRAC_PI_2;

/// Error radii are clamped to this before projection, so a zero-error
/// (lossless) cluster projects to a tiny positive extent instead of
/// degenerating the division.
pub const MIN_ERROR_RADIUS: f32 = 1e-10;

/// LOD selection mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LodMode {
    /// Screen-space-error-driven selection.
    #[default]
    Automatic,
    /// Draw exactly the clusters of one LOD level - operator override.
    Forced,
}

impl LodMode {
    /// Encoding pushed to the GPU.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Automatic => 0,
            Self::Forced => 1,
        }
    }
}

/// Operator-tunable LOD selection settings.
///
/// Loadable from config files; the defaults match the interactive
/// debug-overlay defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodSettings {
    /// Selection mode.
    pub mode: LodMode,
    /// Screen-space error threshold in pixels (automatic mode).
    pub error_threshold: f32,
    /// LOD level to draw (forced mode).
    pub forced_lod: u32,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            mode: LodMode::Automatic,
            error_threshold: 1.0,
            forced_lod: 0,
        }
    }
}

/// Projects a view-space sphere to its screen-space radius in pixels.
///
/// Non-finite radii are returned unchanged, so `+inf` parent errors stay
/// "always above threshold" and any NaN poisons the comparison to false.
/// The formula is the classic projected-sphere-radius derivation:
/// `screen_height * cot(fov/2) * r / sqrt(d^2 - r^2)`.
#[must_use]
pub fn projected_sphere_radius(sphere: &Sphere, screen_height: f32) -> f32 {
    if !sphere.radius.is_finite() {
        return sphere.radius;
    }
    let cot_half_fov = 1.0 / (LOD_TEST_FOV / 2.0).tan();
    let d2 = sphere.center.length_squared();
    let r = sphere.radius;
    screen_height * cot_half_fov * r / (d2 - r * r).sqrt()
}

/// The cut test: should `cluster`, placed by `model_transform`, be drawn?
#[must_use]
pub fn cluster_cut_test(
    cluster: &ClusterGpu,
    model_transform: &Mat4,
    view: &Mat4,
    screen_height: f32,
    settings: &LodSettings,
) -> bool {
    match settings.mode {
        LodMode::Forced => cluster.lod == settings.forced_lod,
        LodMode::Automatic => {
            let complete = *view * *model_transform * cluster.transform;

            let own = Sphere::new(
                cluster.bounding_sphere.center,
                cluster.error.max(MIN_ERROR_RADIUS),
            )
            .transformed(&complete);
            let own_error = projected_sphere_radius(&own, screen_height);

            let parent = Sphere::new(
                cluster.parent_bounding_sphere.center,
                cluster.parent_error.max(MIN_ERROR_RADIUS),
            )
            .transformed(&complete);
            let parent_error = projected_sphere_radius(&parent, screen_height);

            own_error <= settings.error_threshold && parent_error > settings.error_threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use glam::Vec3;

    const SCREEN_HEIGHT: f32 = 1080.0;

    fn cluster(lod: u32, error: f32, parent_error: f32) -> ClusterGpu {
        ClusterGpu {
            transform: Mat4::IDENTITY,
            bounding_sphere: Sphere::new(Vec3::ZERO, 1.0),
            parent_bounding_sphere: Sphere::new(Vec3::ZERO, 1.0),
            error,
            parent_error,
            lod,
            ..ClusterGpu::zeroed()
        }
    }

    fn camera_at_distance(d: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, -d))
    }

    fn settings(threshold: f32) -> LodSettings {
        LodSettings {
            mode: LodMode::Automatic,
            error_threshold: threshold,
            ..LodSettings::default()
        }
    }

    #[test]
    fn test_zero_error_cluster_always_selected() {
        // Zero self error clamps to epsilon and projects below any
        // positive finite threshold; infinite parent error keeps the
        // second condition true.
        let c = cluster(0, 0.0, f32::INFINITY);
        let view = camera_at_distance(10.0);
        for threshold in [0.01, 0.1, 1.0, 1000.0] {
            assert!(cluster_cut_test(
                &c,
                &Mat4::IDENTITY,
                &view,
                SCREEN_HEIGHT,
                &settings(threshold)
            ));
        }
    }

    #[test]
    fn test_infinite_parent_error_projects_infinite() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -50.0), f32::INFINITY);
        assert!(projected_sphere_radius(&sphere, SCREEN_HEIGHT).is_infinite());
    }

    #[test]
    fn test_parent_condition_rejects_fine_clusters_far_away() {
        // Far away, the parent's error also projects below threshold, so
        // the fine cluster is skipped and its ancestor takes over.
        let leaf = cluster(0, 0.1, 0.5);
        let parent = cluster(1, 0.5, f32::INFINITY);
        let far = camera_at_distance(10_000.0);
        assert!(!cluster_cut_test(
            &leaf,
            &Mat4::IDENTITY,
            &far,
            SCREEN_HEIGHT,
            &settings(1.0)
        ));
        assert!(cluster_cut_test(
            &parent,
            &Mat4::IDENTITY,
            &far,
            SCREEN_HEIGHT,
            &settings(1.0)
        ));
    }

    #[test]
    fn test_forced_mode_matches_lod_level_only() {
        let s = LodSettings {
            mode: LodMode::Forced,
            forced_lod: 2,
            ..LodSettings::default()
        };
        let view = camera_at_distance(1.0);
        assert!(cluster_cut_test(
            &cluster(2, 100.0, 0.0),
            &Mat4::IDENTITY,
            &view,
            SCREEN_HEIGHT,
            &s
        ));
        assert!(!cluster_cut_test(
            &cluster(1, 0.0, f32::INFINITY),
            &Mat4::IDENTITY,
            &view,
            SCREEN_HEIGHT,
            &s
        ));
    }

    #[test]
    fn test_selection_count_monotone_in_threshold() {
        // Three-level chain: leaf -> mid -> root. For growing thresholds
        // the number of selected clusters must never increase.
        let hierarchy = [
            cluster(0, 0.0, 2.0),
            cluster(1, 2.0, 8.0),
            cluster(2, 8.0, f32::INFINITY),
        ];
        let view = camera_at_distance(100.0);

        let mut last_count = usize::MAX;
        let mut thresholds = vec![0.001, 0.01, 0.1, 1.0, 10.0, 100.0, 1000.0, 1e6];
        thresholds.push(f32::INFINITY);
        for threshold in thresholds {
            let count = hierarchy
                .iter()
                .filter(|c| {
                    cluster_cut_test(c, &Mat4::IDENTITY, &view, SCREEN_HEIGHT, &settings(threshold))
                })
                .count();
            assert!(count <= 1, "a chain admits at most one selected cluster");
            assert!(
                count <= last_count,
                "coarser threshold {threshold} selected more clusters"
            );
            last_count = count;
        }
    }

    #[test]
    fn test_settings_roundtrip_through_toml() {
        let text = "mode = \"forced\"\nforced_lod = 3\n";
        let parsed: LodSettings = toml::from_str(text).unwrap();
        assert_eq!(parsed.mode, LodMode::Forced);
        assert_eq!(parsed.forced_lod, 3);
        // Unspecified fields fall back to defaults.
        assert!((parsed.error_threshold - 1.0).abs() < f32::EPSILON);

        let rendered = toml::to_string(&parsed).unwrap();
        let reparsed: LodSettings = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed, parsed);
    }
}
