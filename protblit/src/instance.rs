//! Vulkan library loading and instance creation.
//!
//! The instance is the entry point into the API: it is created once at
//! startup and is only used to enumerate physical devices and to open the
//! logical [`Device`](crate::device::Device).

use crate::{Error, VulkanError};
use ash::vk;
use std::sync::Arc;

/// An initialized Vulkan library with one instance created from it.
pub struct Instance {
    handle: ash::Instance,
    // The loaded library must outlive every call made through `handle`.
    _entry: ash::Entry,
}

impl Instance {
    /// Loads the Vulkan library and creates the instance.
    ///
    /// The instance requests API version 1.1, which is where protected
    /// memory entered core. No extensions and no layers are enabled.
    pub fn new() -> Result<Arc<Instance>, Error> {
        let entry = unsafe { ash::Entry::load() }?;

        let application_info = vk::ApplicationInfo::default()
            .application_name(c"blit-protected")
            .api_version(vk::make_api_version(0, 1, 1, 0));
        let create_info = vk::InstanceCreateInfo::default().application_info(&application_info);

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VulkanError::from)?;

        Ok(Arc::new(Instance { handle, _entry: entry }))
    }

    /// Enumerates the physical devices available on the system.
    ///
    /// The order of the returned devices is the driver's; callers that only
    /// want one device take the first entry.
    pub fn enumerate_physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>, VulkanError> {
        let physical_devices = unsafe { self.handle.enumerate_physical_devices() }?;

        Ok(physical_devices)
    }

    pub(crate) fn handle(&self) -> &ash::Instance {
        &self.handle
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Vulkan instance>")
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { self.handle.destroy_instance(None) };
    }
}
