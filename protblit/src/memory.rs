//! Device memory: the memory-type table, type selection and allocations.
//!
//! The memory-type table of the physical device is mirrored once into plain
//! Rust values at device creation, so that [`select_memory_type`] is a pure
//! function over data and its first-match behavior can be pinned by tests.

use crate::{device::Device, DeviceSize, VulkanError};
use ash::vk;
use std::{ffi::c_void, ptr, slice, sync::Arc};

/// Properties of the memory of a physical device.
#[derive(Clone, Debug)]
pub struct MemoryProperties {
    /// The available memory types, in driver enumeration order.
    pub memory_types: Vec<MemoryType>,
}

/// A memory type in a physical device.
#[derive(Clone, Debug)]
pub struct MemoryType {
    /// The properties of this memory type.
    pub property_flags: vk::MemoryPropertyFlags,

    /// The index of the memory heap that this memory type corresponds to.
    pub heap_index: u32,
}

impl From<vk::PhysicalDeviceMemoryProperties> for MemoryProperties {
    fn from(val: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            memory_types: val.memory_types[0..val.memory_type_count as usize]
                .iter()
                .map(|vk_memory_type| MemoryType {
                    property_flags: vk_memory_type.property_flags,
                    heap_index: vk_memory_type.heap_index,
                })
                .collect(),
        }
    }
}

/// Picks a memory type for a resource.
///
/// A type at index `i` is eligible when bit `i` is set in `allowed_mask`
/// (the resource's `memory_type_bits`), its flags include `DEVICE_LOCAL`,
/// and they include `HOST_VISIBLE` and/or `PROTECTED` when requested. The
/// first eligible index in table order wins; the scan is deliberately not a
/// best-fit search, so the outcome on a given device is stable and
/// order-dependent on the driver's enumeration.
///
/// Returns `None` when no type qualifies.
pub fn select_memory_type(
    memory_properties: &MemoryProperties,
    allowed_mask: u32,
    host_visible: bool,
    protected: bool,
) -> Option<u32> {
    let mut required = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    if host_visible {
        required |= vk::MemoryPropertyFlags::HOST_VISIBLE;
    }
    if protected {
        required |= vk::MemoryPropertyFlags::PROTECTED;
    }

    memory_properties
        .memory_types
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            allowed_mask & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
}

/// A single allocation of device memory, owned by exactly one resource.
pub struct DeviceMemory {
    handle: vk::DeviceMemory,
    size: DeviceSize,
    memory_type_index: u32,
    device: Arc<Device>,
}

impl DeviceMemory {
    /// Allocates `size` bytes from the given memory type.
    pub fn allocate(
        device: &Arc<Device>,
        size: DeviceSize,
        memory_type_index: u32,
    ) -> Result<DeviceMemory, VulkanError> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        let handle = unsafe { device.handle().allocate_memory(&allocate_info, None) }?;

        Ok(DeviceMemory {
            handle,
            size,
            memory_type_index,
            device: device.clone(),
        })
    }

    /// Maps the first `size` bytes into host address space.
    ///
    /// The mapping is released when the returned guard is dropped. Only
    /// host-visible allocations can be mapped; a protected allocation makes
    /// this call fail on the device side.
    pub fn map(&self, size: DeviceSize) -> Result<MappedMemory<'_>, VulkanError> {
        assert!(size <= self.size);

        let ptr = unsafe {
            self.device
                .handle()
                .map_memory(self.handle, 0, size, vk::MemoryMapFlags::empty())
        }?;

        Ok(MappedMemory {
            memory: self,
            ptr,
            len: size as usize,
        })
    }

    /// Returns the index in the memory-type table this memory was allocated
    /// from.
    #[inline]
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    /// Returns the size of the allocation in bytes.
    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    pub(crate) fn handle(&self) -> vk::DeviceMemory {
        self.handle
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        unsafe { self.device.handle().free_memory(self.handle, None) };
    }
}

/// A live host mapping of a [`DeviceMemory`] allocation.
///
/// Unmaps on drop, so the pointer stays valid for as long as the guard is
/// held, including across an encode call that reads from it.
pub struct MappedMemory<'a> {
    memory: &'a DeviceMemory,
    ptr: *mut c_void,
    len: usize,
}

impl MappedMemory<'_> {
    /// Copies `bytes` to the start of the mapping.
    ///
    /// # Panics
    ///
    /// - Panics if `bytes` is longer than the mapped range.
    pub fn write(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.len);

        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.cast::<u8>(), bytes.len()) };
    }

    /// Returns the mapped range as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.cast_const().cast::<u8>(), self.len) }
    }
}

impl Drop for MappedMemory<'_> {
    fn drop(&mut self) {
        unsafe { self.memory.device.handle().unmap_memory(self.memory.handle) };
    }
}
