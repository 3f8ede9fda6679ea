use ash::vk;

use crate::renderer::core::error::{report, ContextError, ContextResult};

/// Owned fence, destroyed on drop
pub struct Fence {
    device: ash::Device,
    handle: vk::Fence,
}

impl Fence {
    pub fn new(device: &ash::Device, flags: vk::FenceCreateFlags) -> ContextResult<Self> {
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let handle = unsafe { device.create_fence(&fence_info, None) }
            .map_err(|result| report("Creating a fence", ContextError::FenceCreation(result)))?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Blocks until the fence is signaled. There is no timeout.
    pub fn wait(&self) -> ContextResult<()> {
        unsafe { self.device.wait_for_fences(&[self.handle], true, u64::MAX) }
            .map_err(|result| report("Waiting for a fence", ContextError::FenceWait(result)))
    }

    pub fn reset(&self) -> ContextResult<()> {
        unsafe { self.device.reset_fences(&[self.handle]) }
            .map_err(|result| report("Resetting a fence", ContextError::FenceReset(result)))
    }

    pub fn wait_and_reset(&self) -> ContextResult<()> {
        self.wait()?;
        self.reset()
    }

    /// Whether the fence is signaled, without blocking
    pub fn status(&self) -> ContextResult<bool> {
        unsafe { self.device.get_fence_status(self.handle) }
            .map_err(|result| report("Querying fence status", ContextError::FenceStatus(result)))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}

/// Owned binary semaphore, destroyed on drop
pub struct Semaphore {
    device: ash::Device,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &ash::Device) -> ContextResult<Self> {
        let handle = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|result| {
                report("Creating a semaphore", ContextError::SemaphoreCreation(result))
            })?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}
