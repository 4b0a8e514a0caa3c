//! # VIREO Core
//!
//! Shared primitives for the VIREO renderer:
//!
//! - [`pool::SlotPool`] - a reference-counted handle arena that assigns a
//!   dense integer slot to every created object, so GPU-visible parallel
//!   arrays can be indexed directly by slot.
//! - [`math::Sphere`] - a byte-castable bounding sphere with the affine
//!   transform used by screen-space error projection.

pub mod math;
pub mod pool;

pub use math::Sphere;
pub use pool::SlotPool;
