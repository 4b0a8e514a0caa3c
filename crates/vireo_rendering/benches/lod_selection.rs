//! Benchmarks of the LOD cut test, which the CPU mirror evaluates once per
//! (instance, cluster) pair.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{Mat4, Vec3};
use vireo_core::Sphere;
use vireo_rendering::lod::{cluster_cut_test, LodSettings};
use vireo_rendering::ClusterGpu;

const CLUSTER_COUNT: usize = 10_000;
const SCREEN_HEIGHT: f32 = 1080.0;

/// A synthetic hierarchy slice: errors double per level, positions spread
/// across a 200-unit shell so distances vary.
fn synthetic_clusters() -> Vec<ClusterGpu> {
    (0..CLUSTER_COUNT)
        .map(|i| {
            let level = (i % 8) as f32;
            let error = if level == 0.0 { 0.0 } else { 0.5 * 2f32.powf(level - 1.0) };
            let parent_error = if level == 7.0 {
                f32::INFINITY
            } else {
                0.5 * 2f32.powf(level)
            };
            let angle = i as f32 * 0.37;
            let center = Vec3::new(angle.cos(), angle.sin(), -1.0) * (50.0 + (i % 151) as f32);
            ClusterGpu {
                transform: Mat4::IDENTITY,
                bounding_sphere: Sphere::new(center, 1.0),
                parent_bounding_sphere: Sphere::new(center, 2.0),
                vertex_address: 0,
                index_address: 0,
                error,
                parent_error,
                lod: (i % 8) as u32,
                triangle_count: 124,
                vertex_count: 64,
                _pad: [0; 3],
            }
        })
        .collect()
}

fn bench_cut_test(c: &mut Criterion) {
    let clusters = synthetic_clusters();
    let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
    let model = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
    let settings = LodSettings::default();

    c.bench_function("cut_test_10k_clusters", |b| {
        b.iter(|| {
            let mut selected = 0u32;
            for cluster in &clusters {
                if cluster_cut_test(
                    black_box(cluster),
                    &model,
                    &view,
                    SCREEN_HEIGHT,
                    &settings,
                ) {
                    selected += 1;
                }
            }
            black_box(selected)
        });
    });
}

criterion_group!(benches, bench_cut_test);
criterion_main!(benches);
