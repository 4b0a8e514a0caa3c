//! Rendering statistics.
//!
//! The mesh dispatch accumulates a triangle counter into a host-mappable
//! stats buffer; the CPU reads it back (one frame late, by construction)
//! and folds it into [`RenderStats`] for overlays and tests.

use bytemuck::{Pod, Zeroable};

/// GPU-side stats record, one per viewport per frame slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct StatsGpu {
    /// Triangles emitted by the dispatch.
    pub total_triangle_count: u32,
}

/// Statistics from the most recent `render` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderStats {
    /// Cluster instances appended to the active list this frame.
    pub active_instances: u32,
    /// Live model instances across all viewports.
    pub live_models: u32,
    /// Live geometry templates.
    pub live_templates: u32,
    /// Records in the global cluster array (live and dead templates').
    pub total_clusters: u32,
    /// Triangles drawn, read back from the previous use of this frame
    /// slot. Zero until the slot has been revisited once.
    pub triangles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<StatsGpu>(), 4);
    }
}
