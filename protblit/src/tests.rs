#![cfg(test)]

/// Creates a device and its protected queue, or returns from the test when
/// the machine has no Vulkan library, no device, or no protected-memory
/// support. Device-dependent tests skip silently on such machines.
macro_rules! protected_context {
    () => {{
        let instance = match $crate::instance::Instance::new() {
            Ok(instance) => instance,
            Err(_) => return,
        };

        let physical_devices = match instance.enumerate_physical_devices() {
            Ok(physical_devices) => physical_devices,
            Err(_) => return,
        };

        let physical_device = match physical_devices.first().copied() {
            Some(physical_device) => physical_device,
            None => return,
        };

        match $crate::device::Device::new(&instance, physical_device) {
            Ok(device_and_queue) => device_and_queue,
            Err(_) => return,
        }
    }};
}
