//! Host-visible staging and readback buffers.
//!
//! Both buffers of the transfer are linear, exclusively shared and bound to
//! host-visible, unprotected memory, so the host can map them to write the
//! input pixels and to read the recovered ones. They are the only resources
//! of this crate whose memory is reachable from host code.

use crate::{
    device::Device,
    memory::{select_memory_type, DeviceMemory},
    DeviceSize, EnvironmentError, Error, VulkanError,
};
use ash::vk;
use std::sync::Arc;

/// A buffer bound to freshly allocated host-visible memory.
pub struct Buffer {
    handle: vk::Buffer,
    memory: DeviceMemory,
    size: DeviceSize,
    device: Arc<Device>,
}

impl Buffer {
    /// Creates the staging buffer the decoded pixels are written into before
    /// the transfer.
    pub fn transfer_source(device: &Arc<Device>, size: DeviceSize) -> Result<Buffer, Error> {
        Buffer::new(device, size, vk::BufferUsageFlags::TRANSFER_SRC)
    }

    /// Creates the readback buffer the pixels are copied back out into after
    /// passing through the protected image.
    pub fn transfer_destination(device: &Arc<Device>, size: DeviceSize) -> Result<Buffer, Error> {
        Buffer::new(device, size, vk::BufferUsageFlags::TRANSFER_DST)
    }

    fn new(
        device: &Arc<Device>,
        size: DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer, Error> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.handle().create_buffer(&create_info, None) }
            .map_err(VulkanError::from)?;

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(handle) };

        let memory_type_index = select_memory_type(
            device.memory_properties(),
            requirements.memory_type_bits,
            true,
            false,
        )
        .ok_or(EnvironmentError::NoSuitableMemoryType)?;

        let memory = DeviceMemory::allocate(device, requirements.size, memory_type_index)?;

        unsafe {
            device
                .handle()
                .bind_buffer_memory(handle, memory.handle(), 0)
        }
        .map_err(VulkanError::from)?;

        Ok(Buffer {
            handle,
            memory,
            size,
            device: device.clone(),
        })
    }

    /// Returns the memory region backing this buffer, for mapping.
    #[inline]
    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// Returns the capacity of the buffer in bytes.
    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    pub(crate) fn handle(&self) -> vk::Buffer {
        self.handle
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // The buffer is destroyed before its memory is freed by the field
        // drop that follows.
        unsafe { self.device.handle().destroy_buffer(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::Buffer;

    #[test]
    fn create_and_map_source_buffer() {
        let (device, _queue) = protected_context!();

        // Devices without a device-local host-visible memory type cannot
        // create the staging buffers at all; skip those.
        let buffer = match Buffer::transfer_source(&device, 1024) {
            Ok(buffer) => buffer,
            Err(_) => return,
        };
        assert_eq!(buffer.size(), 1024);

        let mut mapped = buffer.memory().map(1024).unwrap();
        mapped.write(&[0xau8; 1024]);
        assert_eq!(mapped.as_slice()[0], 0xa);
    }
}
