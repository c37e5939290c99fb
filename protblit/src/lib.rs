//! Round-trip of pixel data through protected Vulkan device memory.
//!
//! This crate moves an image into GPU memory that the host is not allowed to
//! map, then recovers it through the device's own protected copy path. It is
//! a verification harness for protected-content pipelines, not a renderer.
//!
//! - The [`Instance`](crate::instance::Instance) loads the Vulkan library and
//!   lets you enumerate the physical devices of the system.
//!
//! - The [`Device`](crate::device::Device) opens the selected physical device
//!   with the protected-memory feature enabled and a single protected queue.
//!
//! - [`Buffer`](crate::buffer::Buffer)s are host-visible staging and readback
//!   storage; the [`ProtectedImage`](crate::image::ProtectedImage) is the
//!   device-local, protected resource the pixels pass through. The image's
//!   backing memory is deliberately unreachable from host code: only buffer
//!   memory can be mapped.
//!
//! - The [`ProtectedTransfer`](crate::transfer::ProtectedTransfer) records
//!   the barrier/copy sequence into a protected command buffer, submits it
//!   once, and waits for the device to go idle.
//!
//! - The [`bitmap`](crate::bitmap) module is the boundary to the PNG codec:
//!   it decodes input files into packed RGBA and encodes the recovered bytes
//!   back out.

use ash::vk;
use std::{
    error::Error as StdError,
    fmt::{Display, Error as FmtError, Formatter},
};

#[macro_use]
mod tests;
pub mod bitmap;
pub mod buffer;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod transfer;

/// Represents memory size and offset values on a Vulkan device.
pub use ash::vk::DeviceSize;

/// Error reported by a raw Vulkan API call.
///
/// One variant per result code this tool can meaningfully encounter; anything
/// else is carried through as [`Unnamed`](VulkanError::Unnamed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VulkanError {
    OutOfHostMemory,
    OutOfDeviceMemory,
    InitializationFailed,
    DeviceLost,
    MemoryMapFailed,
    ExtensionNotPresent,
    FeatureNotPresent,
    TooManyObjects,
    IncompatibleDriver,
    Unnamed(vk::Result),
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => VulkanError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => VulkanError::OutOfDeviceMemory,
            vk::Result::ERROR_INITIALIZATION_FAILED => VulkanError::InitializationFailed,
            vk::Result::ERROR_DEVICE_LOST => VulkanError::DeviceLost,
            vk::Result::ERROR_MEMORY_MAP_FAILED => VulkanError::MemoryMapFailed,
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => VulkanError::ExtensionNotPresent,
            vk::Result::ERROR_FEATURE_NOT_PRESENT => VulkanError::FeatureNotPresent,
            vk::Result::ERROR_TOO_MANY_OBJECTS => VulkanError::TooManyObjects,
            vk::Result::ERROR_INCOMPATIBLE_DRIVER => VulkanError::IncompatibleDriver,
            result => VulkanError::Unnamed(result),
        }
    }
}

impl StdError for VulkanError {}

impl Display for VulkanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            VulkanError::OutOfHostMemory => write!(f, "a host memory allocation has failed"),
            VulkanError::OutOfDeviceMemory => write!(f, "a device memory allocation has failed"),
            VulkanError::InitializationFailed => {
                write!(f, "initialization of an object could not be completed")
            }
            VulkanError::DeviceLost => write!(f, "the logical or physical device has been lost"),
            VulkanError::MemoryMapFailed => write!(f, "mapping of a memory object has failed"),
            VulkanError::ExtensionNotPresent => {
                write!(f, "a requested extension is not supported")
            }
            VulkanError::FeatureNotPresent => write!(f, "a requested feature is not supported"),
            VulkanError::TooManyObjects => {
                write!(f, "too many objects of the type have already been created")
            }
            VulkanError::IncompatibleDriver => {
                write!(f, "the requested version of Vulkan is not supported by the driver")
            }
            VulkanError::Unnamed(result) => {
                write!(f, "unnamed error, VkResult value {}", result.as_raw())
            }
        }
    }
}

/// The execution environment cannot run the protected transfer at all.
///
/// None of these are recoverable: they describe the machine, not the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentError {
    /// Instance enumeration returned no physical devices.
    NoPhysicalDevice,
    /// The selected physical device does not advertise the protected-memory
    /// feature.
    ProtectedMemoryUnsupported,
    /// The first queue family of the selected device does not support
    /// graphics operations.
    NoGraphicsQueueFamily,
    /// No memory type satisfies the visibility and protection constraints of
    /// a resource.
    NoSuitableMemoryType,
}

impl StdError for EnvironmentError {}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            EnvironmentError::NoPhysicalDevice => write!(f, "no physical device available"),
            EnvironmentError::ProtectedMemoryUnsupported => {
                write!(f, "the device does not support protected memory")
            }
            EnvironmentError::NoGraphicsQueueFamily => {
                write!(f, "the first queue family does not support graphics operations")
            }
            EnvironmentError::NoSuitableMemoryType => {
                write!(f, "no memory type satisfies the requested properties")
            }
        }
    }
}

/// Any failure the transfer tool can hit, reported once at the top level.
#[derive(Debug)]
pub enum Error {
    /// The Vulkan shared library could not be loaded.
    Library(ash::LoadingError),
    /// The machine cannot run the transfer (missing device, feature, queue
    /// family or memory type).
    Environment(EnvironmentError),
    /// A Vulkan API call failed.
    Vulkan(VulkanError),
    /// Reading, decoding or encoding an image file failed.
    Bitmap(bitmap::BitmapError),
}

impl From<ash::LoadingError> for Error {
    fn from(err: ash::LoadingError) -> Self {
        Error::Library(err)
    }
}

impl From<EnvironmentError> for Error {
    fn from(err: EnvironmentError) -> Self {
        Error::Environment(err)
    }
}

impl From<VulkanError> for Error {
    fn from(err: VulkanError) -> Self {
        Error::Vulkan(err)
    }
}

impl From<bitmap::BitmapError> for Error {
    fn from(err: bitmap::BitmapError) -> Self {
        Error::Bitmap(err)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Library(err) => Some(err),
            Error::Environment(err) => Some(err),
            Error::Vulkan(err) => Some(err),
            Error::Bitmap(err) => Some(err),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Error::Library(err) => write!(f, "could not load the Vulkan library: {}", err),
            Error::Environment(err) => write!(f, "{}", err),
            Error::Vulkan(err) => write!(f, "{}", err),
            Error::Bitmap(err) => write!(f, "{}", err),
        }
    }
}
