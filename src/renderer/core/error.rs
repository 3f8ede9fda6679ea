use ash::vk;
use thiserror::Error;

use crate::renderer::core::queue::ResolveError;

pub type ContextResult<T> = Result<T, ContextError>;

/// Recoverable failures reported by the [`ResourceContext`](super::context::ResourceContext).
///
/// Every variant produced by a failing Vulkan call carries the driver's status code,
/// available through [`ContextError::status`].
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("No Vulkan instance has been created")]
    NoInstance,

    #[error("No physical device has been selected")]
    NoPhysicalDevice,

    #[error("No logical device has been created")]
    NoDevice,

    #[error("No swapchain has been created")]
    NoSwapchain,

    #[error("No surface is attached to the context")]
    NoSurface,

    #[error("A surface cannot be replaced while a swapchain is built on it")]
    SurfaceInUse,

    #[error("Failed to create a Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("Failed to enumerate {what}: {result}")]
    Enumeration {
        what: &'static str,
        result: vk::Result,
    },

    #[error("Physical device index {index} is out of range ({count} available)")]
    InvalidDeviceIndex { index: usize, count: usize },

    #[error("No usable queue families on physical device {index}: {source}")]
    QueueFamilyResolution {
        index: usize,
        #[source]
        source: ResolveError,
    },

    #[error("Failed to create a logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Failed to wait for the device to become idle: {0}")]
    DeviceWait(vk::Result),

    #[error("Failed to wait for a queue to become idle: {0}")]
    QueueIdleWait(vk::Result),

    #[error("Failed to get surface capabilities: {0}")]
    SurfaceCapabilities(vk::Result),

    #[error("Failed to get surface formats: {0}")]
    SurfaceFormats(vk::Result),

    #[error("Failed to get surface present modes: {0}")]
    PresentModes(vk::Result),

    #[error("Surface format {format:?} with color space {color_space:?} is not supported")]
    FormatNotSupported {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    #[error("Failed to create a swapchain: {0}")]
    SwapchainCreation(vk::Result),

    #[error("Failed to get swapchain images: {0}")]
    SwapchainImages(vk::Result),

    #[error("Failed to create a swapchain image view: {0}")]
    ImageViewCreation(vk::Result),

    #[error("Failed to create a fence: {0}")]
    FenceCreation(vk::Result),

    #[error("Failed to wait for a fence: {0}")]
    FenceWait(vk::Result),

    #[error("Failed to reset a fence: {0}")]
    FenceReset(vk::Result),

    #[error("Failed to get the status of a fence: {0}")]
    FenceStatus(vk::Result),

    #[error("Failed to create a semaphore: {0}")]
    SemaphoreCreation(vk::Result),
}

impl ContextError {
    /// Underlying Vulkan status code, if the failure came from the driver.
    pub fn status(&self) -> Option<vk::Result> {
        match self {
            Self::InstanceCreation(result)
            | Self::DeviceCreation(result)
            | Self::DeviceWait(result)
            | Self::QueueIdleWait(result)
            | Self::SurfaceCapabilities(result)
            | Self::SurfaceFormats(result)
            | Self::PresentModes(result)
            | Self::SwapchainCreation(result)
            | Self::SwapchainImages(result)
            | Self::ImageViewCreation(result)
            | Self::FenceCreation(result)
            | Self::FenceWait(result)
            | Self::FenceReset(result)
            | Self::FenceStatus(result)
            | Self::SemaphoreCreation(result) => Some(*result),
            Self::Enumeration { result, .. } => Some(*result),
            Self::FormatNotSupported { .. } => Some(vk::Result::ERROR_FORMAT_NOT_SUPPORTED),
            Self::QueueFamilyResolution { source, .. } => source.status(),
            Self::Loading(_)
            | Self::NoInstance
            | Self::NoPhysicalDevice
            | Self::NoDevice
            | Self::NoSwapchain
            | Self::NoSurface
            | Self::SurfaceInUse
            | Self::InvalidDeviceIndex { .. } => None,
        }
    }
}

/// Driver states that leave no usable path forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("No physical devices found")]
    NoPhysicalDevices,

    #[error("No surface formats found")]
    NoSurfaceFormats,

    #[error("No surface present modes found")]
    NoPresentModes,

    #[error("No swapchain images found")]
    NoSwapchainImages,
}

/// Logs the failure and aborts the process.
pub fn fatal(error: FatalError) -> ! {
    log::error!("Fatal: {}", error);
    std::process::abort()
}

/// Turns an empty driver answer into the matching fatal error
pub(crate) fn require_any<T>(items: Vec<T>, error: FatalError) -> Result<Vec<T>, FatalError> {
    if items.is_empty() {
        Err(error)
    } else {
        Ok(items)
    }
}

/// Logs a failed operation by name and hands the error back for propagation.
pub(crate) fn report(operation: &str, error: ContextError) -> ContextError {
    log::error!("{} failed: {}", operation, error);
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::queue::QueueRoles;

    #[test]
    fn status_carries_vulkan_code() {
        let err = ContextError::SwapchainCreation(vk::Result::ERROR_SURFACE_LOST_KHR);
        assert_eq!(err.status(), Some(vk::Result::ERROR_SURFACE_LOST_KHR));

        let err = ContextError::Enumeration {
            what: "physical devices",
            result: vk::Result::ERROR_INITIALIZATION_FAILED,
        };
        assert_eq!(err.status(), Some(vk::Result::ERROR_INITIALIZATION_FAILED));
    }

    #[test]
    fn status_absent_for_usage_errors() {
        assert_eq!(ContextError::NoDevice.status(), None);
        assert_eq!(
            ContextError::InvalidDeviceIndex { index: 3, count: 1 }.status(),
            None
        );
    }

    #[test]
    fn resolution_status_follows_source() {
        let err = ContextError::QueueFamilyResolution {
            index: 0,
            source: ResolveError::SurfaceSupport(vk::Result::ERROR_SURFACE_LOST_KHR),
        };
        assert_eq!(err.status(), Some(vk::Result::ERROR_SURFACE_LOST_KHR));

        let err = ContextError::QueueFamilyResolution {
            index: 0,
            source: ResolveError::MissingRoles(QueueRoles::new(true, false, false)),
        };
        assert_eq!(err.status(), None);
    }

    #[test]
    fn empty_answers_are_fatal() {
        assert_eq!(
            require_any(Vec::<vk::PresentModeKHR>::new(), FatalError::NoPresentModes),
            Err(FatalError::NoPresentModes)
        );
        assert_eq!(
            require_any(vec![vk::PresentModeKHR::FIFO], FatalError::NoPresentModes),
            Ok(vec![vk::PresentModeKHR::FIFO])
        );
    }

    #[test]
    fn messages_name_the_operation() {
        let err = ContextError::DeviceWait(vk::Result::ERROR_DEVICE_LOST);
        assert!(err.to_string().contains("idle"));
        assert_eq!(FatalError::NoPresentModes.to_string(), "No surface present modes found");
    }
}
