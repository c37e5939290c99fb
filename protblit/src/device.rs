//! Logical device and protected queue creation.
//!
//! The device is opened with the protected-memory feature enabled and exactly
//! one queue, created protected, from queue family 0. This tool assumes a
//! single-device machine whose first queue family supports graphics; both
//! assumptions are checked and turn into environment errors when violated.

use crate::{instance::Instance, memory::MemoryProperties, EnvironmentError, Error, VulkanError};
use ash::vk;
use std::{ffi::CStr, sync::Arc};

/// The queue family every resource and command pool of this tool lives on.
///
/// The selection contract is "the first family must support graphics", not a
/// search over families, so the index is a constant rather than a lookup
/// result.
pub const QUEUE_FAMILY_INDEX: u32 = 0;

/// An open channel of communication with a physical device.
pub struct Device {
    handle: ash::Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: MemoryProperties,
    vendor_id: u32,
    device_name: String,
    // Keeps the instance alive for as long as the device exists.
    instance: Arc<Instance>,
}

impl Device {
    /// Opens the logical device on `physical_device` and retrieves its
    /// protected queue.
    ///
    /// Checks, in order: the protected-memory feature is supported, and the
    /// first queue family supports graphics. The device is created with one
    /// protected queue from family 0, the protected-memory feature enabled
    /// through the features2 chain, and the swapchain extension enabled. The
    /// extension is unused by the transfer itself; it mirrors the device
    /// configuration of the presentation environments this tool diagnoses.
    pub fn new(
        instance: &Arc<Instance>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<(Arc<Device>, Queue), Error> {
        let mut protected_memory_features = vk::PhysicalDeviceProtectedMemoryFeatures::default();
        let mut features2 =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut protected_memory_features);
        unsafe {
            instance
                .handle()
                .get_physical_device_features2(physical_device, &mut features2)
        };

        if protected_memory_features.protected_memory == vk::FALSE {
            return Err(EnvironmentError::ProtectedMemoryUnsupported.into());
        }

        let queue_family_properties = unsafe {
            instance
                .handle()
                .get_physical_device_queue_family_properties(physical_device)
        };
        let first_family_supports_graphics = queue_family_properties
            .first()
            .is_some_and(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS));

        if !first_family_supports_graphics {
            return Err(EnvironmentError::NoGraphicsQueueFamily.into());
        }

        let properties = unsafe {
            instance
                .handle()
                .get_physical_device_properties(physical_device)
        };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .flags(vk::DeviceQueueCreateFlags::PROTECTED)
            .queue_family_index(QUEUE_FAMILY_INDEX)
            .queue_priorities(&queue_priorities);
        let extension_names = [ash::khr::swapchain::NAME.as_ptr()];
        let mut enabled_protected_memory =
            vk::PhysicalDeviceProtectedMemoryFeatures::default().protected_memory(true);
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_names)
            .push_next(&mut enabled_protected_memory);

        let handle = unsafe {
            instance
                .handle()
                .create_device(physical_device, &create_info, None)
        }
        .map_err(VulkanError::from)?;

        let memory_properties = unsafe {
            instance
                .handle()
                .get_physical_device_memory_properties(physical_device)
        }
        .into();

        let device = Arc::new(Device {
            handle,
            physical_device,
            memory_properties,
            vendor_id: properties.vendor_id,
            device_name,
            instance: instance.clone(),
        });

        // A queue created with flags must be fetched with the same flags;
        // the flagless query is invalid for protected queues.
        let queue_info = vk::DeviceQueueInfo2::default()
            .flags(vk::DeviceQueueCreateFlags::PROTECTED)
            .queue_family_index(QUEUE_FAMILY_INDEX)
            .queue_index(0);
        let queue_handle = unsafe { device.handle.get_device_queue2(&queue_info) };

        let queue = Queue {
            handle: queue_handle,
            family_index: QUEUE_FAMILY_INDEX,
            device: device.clone(),
        };

        Ok((device, queue))
    }

    /// Blocks until all work submitted to this device has finished.
    ///
    /// This is the only completion signal the transfer uses; there is no
    /// per-submission fence.
    pub fn wait_idle(&self) -> Result<(), VulkanError> {
        unsafe { self.handle.device_wait_idle() }?;

        Ok(())
    }

    /// Returns the mirrored memory-type table of the physical device.
    #[inline]
    pub fn memory_properties(&self) -> &MemoryProperties {
        &self.memory_properties
    }

    /// Returns the PCI vendor id of the physical device.
    #[inline]
    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    /// Returns the name the driver reports for the physical device.
    #[inline]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Returns the physical device this device was created from.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the instance this device was created from.
    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub(crate) fn handle(&self) -> &ash::Device {
        &self.handle
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Vulkan device {}>", self.device_name)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.handle.device_wait_idle();
            self.handle.destroy_device(None);
        }
    }
}

/// The protected queue commands are submitted to.
pub struct Queue {
    handle: vk::Queue,
    family_index: u32,
    device: Arc<Device>,
}

impl Queue {
    /// Returns the device this queue belongs to.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the index of the queue family this queue was created from.
    #[inline]
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    pub(crate) fn handle(&self) -> vk::Queue {
        self.handle
    }
}
