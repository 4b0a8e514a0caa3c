//! GPU resource seam.
//!
//! The real device allocator and the draw submission backend live outside
//! this crate. What the renderer needs from them is narrow: allocate
//! buffers, stage uploads into them, query device addresses, and hand a
//! finished [`packet::RenderPacket`] to whoever records command buffers.
//!
//! [`HostAllocator`] is the reference backend: system memory, fake but
//! unique device addresses. Tests and headless runs use it directly; a
//! device backend implements [`GpuAllocator`] on its own side of the seam.

pub mod packet;

use std::sync::Arc;

use bitflags::bitflags;
use bytemuck::Pod;
use parking_lot::Mutex;
use thiserror::Error;

bitflags! {
    /// Usage flags requested at buffer allocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        /// Shader storage buffer.
        const STORAGE = 1 << 0;
        /// Destination of staged transfer writes.
        const TRANSFER_DST = 1 << 1;
    }
}

/// Errors reported by a [`GpuAllocator`] backend.
///
/// The cluster renderer never recovers from these - allocation failure is
/// escalated to a panic carrying the diagnostic - but backends report them
/// uniformly so the escalation site can say what actually failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuAllocError {
    /// Device-local memory exhausted.
    #[error("device out of memory allocating {size} bytes")]
    OutOfDeviceMemory {
        /// Requested allocation size in bytes.
        size: u64,
    },
    /// Host-visible memory exhausted.
    #[error("host out of memory allocating {size} bytes")]
    OutOfHostMemory {
        /// Requested allocation size in bytes.
        size: u64,
    },
}

/// Shared storage behind a [`GpuBuffer`] handle.
struct BufferStorage {
    device_address: u64,
    byte_len: u64,
    usage: BufferUsage,
    host_visible: bool,
    contents: Mutex<Vec<u8>>,
}

/// A cheaply clonable handle to one GPU buffer allocation.
///
/// Clones share the allocation; it is released when the last clone drops.
/// Frame-indexed retention relies on exactly that: keeping a clone in a
/// per-frame table keeps the allocation alive for any draw still reading
/// it.
#[derive(Clone)]
pub struct GpuBuffer {
    storage: Arc<BufferStorage>,
}

impl GpuBuffer {
    fn new(device_address: u64, byte_len: u64, usage: BufferUsage, host_visible: bool) -> Self {
        let len = usize::try_from(byte_len).expect("buffer size exceeds host address space");
        Self {
            storage: Arc::new(BufferStorage {
                device_address,
                byte_len,
                usage,
                host_visible,
                contents: Mutex::new(vec![0; len]),
            }),
        }
    }

    /// Returns the buffer size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.storage.byte_len
    }

    /// Returns the buffer's device address.
    ///
    /// Cluster records embed `device_address() + offset` so mesh shaders
    /// can fetch vertex/index blocks without descriptor indirection.
    #[must_use]
    pub fn device_address(&self) -> u64 {
        self.storage.device_address
    }

    /// Returns the usage flags requested at allocation.
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.storage.usage
    }

    /// Returns true if the buffer can be mapped for host writes.
    #[must_use]
    pub fn is_host_visible(&self) -> bool {
        self.storage.host_visible
    }

    /// Stages an upload of `data` starting at byte offset 0.
    ///
    /// The upload window is the only time the CPU writes a device buffer;
    /// afterwards the buffer is effectively immutable until replaced
    /// wholesale. Uploading past the end of the buffer is a contract
    /// violation.
    pub fn stage_upload<T: Pod>(&self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut contents = self.storage.contents.lock();
        assert!(
            bytes.len() <= contents.len(),
            "staged upload of {} bytes into a {}-byte buffer",
            bytes.len(),
            contents.len()
        );
        contents[..bytes.len()].copy_from_slice(bytes);
    }

    /// Maps the buffer and passes its contents to `f` as a `&mut [T]`.
    ///
    /// Only host-visible (staging) buffers may be mapped; mapping a
    /// device-local buffer is a contract violation. The slice covers as
    /// many whole `T` records as fit in the buffer.
    pub fn with_mapped<T: Pod, R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        assert!(
            self.storage.host_visible,
            "mapped a device-local buffer; only staging buffers are host-visible"
        );
        let mut contents = self.storage.contents.lock();
        let whole = contents.len() / std::mem::size_of::<T>() * std::mem::size_of::<T>();
        f(bytemuck::cast_slice_mut(&mut contents[..whole]))
    }

    /// Reads the buffer contents back as a vector of `T`.
    ///
    /// Readback path for stats buffers and tests.
    #[must_use]
    pub fn read<T: Pod>(&self) -> Vec<T> {
        let contents = self.storage.contents.lock();
        let whole = contents.len() / std::mem::size_of::<T>() * std::mem::size_of::<T>();
        bytemuck::cast_slice(&contents[..whole]).to_vec()
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("device_address", &self.storage.device_address)
            .field("byte_len", &self.storage.byte_len)
            .field("usage", &self.storage.usage)
            .field("host_visible", &self.storage.host_visible)
            .finish()
    }
}

/// Allocation interface the renderer consumes from the GPU memory system.
pub trait GpuAllocator: Send {
    /// Allocates a device-local buffer.
    fn allocate_device_buffer(
        &mut self,
        byte_size: u64,
        usage: BufferUsage,
    ) -> Result<GpuBuffer, GpuAllocError>;

    /// Allocates a host-mappable staging buffer.
    fn allocate_staging_buffer(&mut self, byte_size: u64) -> Result<GpuBuffer, GpuAllocError>;

    /// Allocates a host-mappable buffer valid for the current frame only.
    ///
    /// The caller must not retain it past the frame that allocated it; the
    /// backend is free to recycle the memory afterwards.
    fn allocate_transient_buffer(&mut self, byte_size: u64) -> Result<GpuBuffer, GpuAllocError>;
}

/// Device-address alignment handed out by [`HostAllocator`].
const ADDRESS_ALIGNMENT: u64 = 256;

/// Reference allocator backed by system memory.
///
/// Hands out unique, non-overlapping, 256-byte-aligned fake device
/// addresses so address arithmetic in cluster records stays testable
/// without a device.
pub struct HostAllocator {
    next_address: u64,
}

impl HostAllocator {
    /// Creates a host allocator. Address space starts past null so a zero
    /// device address never appears in valid records.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_address: ADDRESS_ALIGNMENT,
        }
    }

    fn take_address_range(&mut self, byte_size: u64) -> u64 {
        let address = self.next_address;
        let aligned = byte_size.max(1).div_ceil(ADDRESS_ALIGNMENT) * ADDRESS_ALIGNMENT;
        self.next_address += aligned;
        address
    }
}

impl Default for HostAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuAllocator for HostAllocator {
    fn allocate_device_buffer(
        &mut self,
        byte_size: u64,
        usage: BufferUsage,
    ) -> Result<GpuBuffer, GpuAllocError> {
        let address = self.take_address_range(byte_size);
        Ok(GpuBuffer::new(address, byte_size, usage, false))
    }

    fn allocate_staging_buffer(&mut self, byte_size: u64) -> Result<GpuBuffer, GpuAllocError> {
        let address = self.take_address_range(byte_size);
        Ok(GpuBuffer::new(
            address,
            byte_size,
            BufferUsage::TRANSFER_DST,
            true,
        ))
    }

    fn allocate_transient_buffer(&mut self, byte_size: u64) -> Result<GpuBuffer, GpuAllocError> {
        let address = self.take_address_range(byte_size);
        Ok(GpuBuffer::new(address, byte_size, BufferUsage::STORAGE, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_unique_and_aligned() {
        let mut alloc = HostAllocator::new();
        let a = alloc
            .allocate_device_buffer(100, BufferUsage::STORAGE)
            .unwrap();
        let b = alloc
            .allocate_device_buffer(100, BufferUsage::STORAGE)
            .unwrap();
        assert_ne!(a.device_address(), b.device_address());
        assert_eq!(a.device_address() % 256, 0);
        assert!(b.device_address() >= a.device_address() + 100);
    }

    #[test]
    fn test_stage_upload_and_read() {
        let mut alloc = HostAllocator::new();
        let buffer = alloc
            .allocate_device_buffer(16, BufferUsage::STORAGE | BufferUsage::TRANSFER_DST)
            .unwrap();
        buffer.stage_upload(&[1u32, 2, 3, 4]);
        assert_eq!(buffer.read::<u32>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mapped_writes_visible_to_readback() {
        let mut alloc = HostAllocator::new();
        let staging = alloc.allocate_staging_buffer(8).unwrap();
        staging.with_mapped::<u32, _>(|records| {
            records[0] = 0xdead;
            records[1] = 0xbeef;
        });
        assert_eq!(staging.read::<u32>(), vec![0xdead, 0xbeef]);
    }

    #[test]
    #[should_panic(expected = "mapped a device-local buffer")]
    fn test_mapping_device_buffer_is_fatal() {
        let mut alloc = HostAllocator::new();
        let buffer = alloc
            .allocate_device_buffer(8, BufferUsage::STORAGE)
            .unwrap();
        buffer.with_mapped::<u32, _>(|_| ());
    }

    #[test]
    fn test_clones_share_storage() {
        let mut alloc = HostAllocator::new();
        let buffer = alloc.allocate_staging_buffer(4).unwrap();
        let retained = buffer.clone();
        buffer.with_mapped::<u32, _>(|records| records[0] = 42);
        assert_eq!(retained.read::<u32>(), vec![42]);
    }
}
