//! The protected image the pixels are relayed through.
//!
//! The image is 2-D, single-mip, single-layer RGBA8 with optimal tiling,
//! created with the protected flag and bound to device-local protected
//! memory. Host code can never observe its contents: the type exposes no
//! mapping path, and the protection flag makes the device reject one anyway.
//! Both transfer usages are enabled because the image is written by the
//! first copy and read back by the second.

use crate::{
    device::Device,
    memory::{select_memory_type, DeviceMemory},
    EnvironmentError, Error, VulkanError,
};
use ash::vk;
use std::sync::Arc;

/// The pixel format every transfer uses.
pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// A 2-D image bound to device-local, protected memory.
pub struct ProtectedImage {
    handle: vk::Image,
    memory: DeviceMemory,
    width: u32,
    height: u32,
    device: Arc<Device>,
}

impl ProtectedImage {
    /// Creates the image and binds it to protected memory.
    pub fn new(device: &Arc<Device>, width: u32, height: u32) -> Result<ProtectedImage, Error> {
        let create_info = vk::ImageCreateInfo::default()
            .flags(vk::ImageCreateFlags::PROTECTED)
            .image_type(vk::ImageType::TYPE_2D)
            .format(FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = unsafe { device.handle().create_image(&create_info, None) }
            .map_err(VulkanError::from)?;

        let requirements = unsafe { device.handle().get_image_memory_requirements(handle) };

        let memory_type_index = select_memory_type(
            device.memory_properties(),
            requirements.memory_type_bits,
            false,
            true,
        )
        .ok_or(EnvironmentError::NoSuitableMemoryType)?;

        let memory = DeviceMemory::allocate(device, requirements.size, memory_type_index)?;

        unsafe {
            device
                .handle()
                .bind_image_memory(handle, memory.handle(), 0)
        }
        .map_err(VulkanError::from)?;

        Ok(ProtectedImage {
            handle,
            memory,
            width,
            height,
            device: device.clone(),
        })
    }

    /// Returns the width of the image in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the index of the memory type the backing allocation came
    /// from.
    ///
    /// The allocation itself stays private: unlike
    /// [`Buffer::memory`](crate::buffer::Buffer::memory) there is no
    /// accessor for it, so no caller can reach a map call with it.
    #[inline]
    pub fn memory_type_index(&self) -> u32 {
        self.memory.memory_type_index()
    }

    pub(crate) fn handle(&self) -> vk::Image {
        self.handle
    }
}

impl Drop for ProtectedImage {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_image(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::ProtectedImage;
    use ash::vk;

    #[test]
    fn image_memory_is_protected() {
        let (device, _queue) = protected_context!();

        let image = match ProtectedImage::new(&device, 64, 64) {
            Ok(image) => image,
            Err(_) => return,
        };

        let memory_type =
            &device.memory_properties().memory_types[image.memory_type_index() as usize];
        assert!(memory_type
            .property_flags
            .contains(vk::MemoryPropertyFlags::PROTECTED));
    }
}
