use std::collections::HashMap;

use ash::vk;

use crate::renderer::config::ContextConfig;
use crate::renderer::core::error::{report, ContextError, ContextResult};
use crate::renderer::core::instance::DebugMessenger;
use crate::renderer::core::listener::{
    self, ContextListener, LifecycleEvent, ListenerToken, Listeners,
};
use crate::renderer::core::queue::{CachedQueueFamilies, QueueFamilyIndices, Queues};
use crate::renderer::core::registry::NameRegistry;
use crate::renderer::core::swapchain::SwapchainState;

/// Owns the Vulkan instance, surface, device and swapchain, and sequences their
/// creation, recreation and destruction.
///
/// Construction is cheap and touches no driver state. Objects are created in the order
/// instance, physical device selection, device, swapchain. Everything is released by
/// [`ResourceContext::destroy`], which also runs on drop.
pub struct ResourceContext {
    pub(crate) config: ContextConfig,
    pub(crate) api_version: u32,

    pub(crate) entry: Option<ash::Entry>,
    pub(crate) instance: Option<ash::Instance>,
    pub(crate) instance_layers: NameRegistry,
    pub(crate) instance_extensions: NameRegistry,
    pub(crate) debug_messenger: Option<DebugMessenger>,

    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: Option<ash::khr::surface::Instance>,
    pub(crate) drawable_extent: vk::Extent2D,

    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) physical_device_properties: vk::PhysicalDeviceProperties,
    pub(crate) physical_device_memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) available_physical_devices: Vec<vk::PhysicalDevice>,
    pub(crate) queue_family_cache: HashMap<vk::PhysicalDevice, CachedQueueFamilies>,

    pub(crate) device: Option<ash::Device>,
    pub(crate) device_extensions: NameRegistry,
    pub(crate) queue_families: QueueFamilyIndices,
    pub(crate) queues: Queues,

    pub(crate) available_surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub(crate) swapchain_loader: Option<ash::khr::swapchain::Device>,
    pub(crate) swapchain: SwapchainState,

    pub(crate) listeners: Listeners,
}

impl ResourceContext {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            api_version: config.api_version,
            drawable_extent: config.fallback_extent,
            config,

            entry: None,
            instance: None,
            instance_layers: NameRegistry::new(),
            instance_extensions: NameRegistry::new(),
            debug_messenger: None,

            surface: vk::SurfaceKHR::null(),
            surface_loader: None,

            physical_device: vk::PhysicalDevice::null(),
            physical_device_properties: vk::PhysicalDeviceProperties::default(),
            physical_device_memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            available_physical_devices: Vec::new(),
            queue_family_cache: HashMap::new(),

            device: None,
            device_extensions: NameRegistry::new(),
            queue_families: QueueFamilyIndices::default(),
            queues: Queues::default(),

            available_surface_formats: Vec::new(),
            swapchain_loader: None,
            swapchain: SwapchainState::default(),

            listeners: Listeners::default(),
        }
    }

    /// Uses an already loaded Vulkan entry instead of loading the library on first use
    pub fn with_entry(config: ContextConfig, entry: ash::Entry) -> Self {
        let mut ctx = Self::new(config);
        ctx.entry = Some(entry);
        ctx
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn entry(&self) -> Option<&ash::Entry> {
        self.entry.as_ref()
    }

    pub fn instance(&self) -> Option<&ash::Instance> {
        self.instance.as_ref()
    }

    pub fn instance_layers(&self) -> &NameRegistry {
        &self.instance_layers
    }

    pub fn instance_extensions(&self) -> &NameRegistry {
        &self.instance_extensions
    }

    pub fn has_debug_messenger(&self) -> bool {
        self.debug_messenger.is_some()
    }

    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        (self.surface != vk::SurfaceKHR::null()).then_some(self.surface)
    }

    pub fn physical_device(&self) -> Option<vk::PhysicalDevice> {
        (self.physical_device != vk::PhysicalDevice::null()).then_some(self.physical_device)
    }

    pub fn physical_device_properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.physical_device_properties
    }

    pub fn physical_device_memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device_memory_properties
    }

    pub fn available_physical_devices(&self) -> &[vk::PhysicalDevice] {
        &self.available_physical_devices
    }

    pub fn device(&self) -> Option<&ash::Device> {
        self.device.as_ref()
    }

    pub fn device_extensions(&self) -> &NameRegistry {
        &self.device_extensions
    }

    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn register_listener(&mut self, listener: Box<dyn ContextListener>) -> ListenerToken {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(
        &mut self,
        token: ListenerToken,
    ) -> Option<Box<dyn ContextListener>> {
        self.listeners.unregister(token)
    }

    pub(crate) fn notify(&mut self, event: LifecycleEvent) {
        let mut entries = self.listeners.take_entries();
        listener::dispatch(&mut entries, event, self);
        self.listeners.restore_entries(entries);
    }

    /// Size the window currently wants, used when the surface does not dictate one
    pub fn set_drawable_extent(&mut self, extent: vk::Extent2D) {
        self.drawable_extent = extent;
    }

    pub fn drawable_extent(&self) -> vk::Extent2D {
        self.drawable_extent
    }

    /// Takes ownership of a surface created for this context's instance.
    ///
    /// A previously attached surface is destroyed. Surface formats and presentation
    /// support resolved for the old surface are dropped, so the next
    /// [`select_physical_device`](ResourceContext::select_physical_device) queries the new
    /// surface.
    pub fn attach_surface(&mut self, surface: vk::SurfaceKHR) -> ContextResult<()> {
        let (Some(entry), Some(instance)) = (self.entry.as_ref(), self.instance.as_ref()) else {
            return Err(ContextError::NoInstance);
        };
        if self.swapchain.is_live() {
            return Err(ContextError::SurfaceInUse);
        }

        let loader = self
            .surface_loader
            .get_or_insert_with(|| ash::khr::surface::Instance::new(entry, instance));
        if self.surface != vk::SurfaceKHR::null() && self.surface != surface {
            unsafe {
                loader.destroy_surface(self.surface, None);
            }
        }

        if self.surface != surface {
            self.forget_presentation_support();
        }
        self.surface = surface;
        Ok(())
    }

    /// Drops everything that was resolved against the current surface
    pub(crate) fn forget_presentation_support(&mut self) {
        for cached in self.queue_family_cache.values_mut() {
            cached.forget_presentation();
        }
        self.queue_families.presentation = None;
        self.available_surface_formats.clear();
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_idle(&self) -> ContextResult<()> {
        let device = self.device.as_ref().ok_or(ContextError::NoDevice)?;
        unsafe { device.device_wait_idle() }
            .map_err(|result| report("Waiting for device idle", ContextError::DeviceWait(result)))
    }

    /// Releases every owned Vulkan object in reverse dependency order.
    ///
    /// Does nothing when no instance exists, so calling it again is harmless.
    pub fn destroy(&mut self) {
        if self.instance.is_none() {
            return;
        }

        if self.device.is_some() {
            // Failure here means the device is lost; destruction proceeds anyway
            let _ = self.wait_idle();
            self.destroy_swapchain();
            self.destroy_device();
        }

        self.destroy_surface();
        self.destroy_debug_messenger();

        if let Some(instance) = self.instance.take() {
            unsafe {
                instance.destroy_instance(None);
            }
        }

        self.physical_device = vk::PhysicalDevice::null();
        self.available_physical_devices.clear();
        self.queue_family_cache.clear();
        self.queue_families = QueueFamilyIndices::default();
        log::debug!("Resource context destroyed");
    }

    fn destroy_surface(&mut self) {
        if self.surface == vk::SurfaceKHR::null() {
            return;
        }
        if let Some(loader) = self.surface_loader.as_ref() {
            unsafe {
                loader.destroy_surface(self.surface, None);
            }
        }
        self.surface = vk::SurfaceKHR::null();
        self.surface_loader = None;
        self.available_surface_formats.clear();
    }
}

impl Drop for ResourceContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
