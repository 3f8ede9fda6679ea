use std::ffi::CStr;

use ash::vk;
use smallvec::SmallVec;

use crate::renderer::core::context::ResourceContext;
use crate::renderer::core::error::{
    fatal, report, require_any, ContextError, ContextResult, FatalError,
};
use crate::renderer::core::listener::LifecycleEvent;
use crate::renderer::core::queue::{
    scan_queue_families, CacheLookup, QueueFamilyIndices, QueueRoles, Queues, ResolveError,
};

const QUEUE_PRIORITIES: [f32; 1] = [1.0];

impl ResourceContext {
    pub fn add_device_extension(&mut self, extension: &CStr) {
        self.device_extensions.add(extension);
    }

    /// Refreshes the list of physical devices and forgets every cached queue family
    /// resolution. Aborts the process when the driver reports no devices at all.
    pub fn enumerate_physical_devices(&mut self) -> ContextResult<()> {
        let instance = self.instance.as_ref().ok_or(ContextError::NoInstance)?;
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|result| {
            report(
                "Enumerating physical devices",
                ContextError::Enumeration {
                    what: "physical devices",
                    result,
                },
            )
        })?;
        let devices = match require_any(devices, FatalError::NoPhysicalDevices) {
            Ok(devices) => devices,
            Err(err) => fatal(err),
        };

        for (index, device) in devices.iter().enumerate() {
            let props = unsafe { instance.get_physical_device_properties(*device) };
            log::debug!(
                "Physical device {}: {} ({:?})",
                index,
                device_name(&props),
                props.device_type,
            );
        }

        self.available_physical_devices = devices;
        self.queue_family_cache.clear();
        Ok(())
    }

    /// Picks the physical device at `index` and resolves its queue families.
    ///
    /// Presentation is requested only when a surface is attached. Results are cached per
    /// device, so a role that was looked for and not found fails again without a rescan.
    /// Selecting a different device takes effect with the next [`create_device`] or
    /// [`recreate_device`].
    ///
    /// [`create_device`]: ResourceContext::create_device
    /// [`recreate_device`]: ResourceContext::recreate_device
    pub fn select_physical_device(
        &mut self,
        index: usize,
        needs_graphics: bool,
        needs_compute: bool,
    ) -> ContextResult<()> {
        let instance = self.instance.as_ref().ok_or(ContextError::NoInstance)?;
        let count = self.available_physical_devices.len();
        let physical_device = *self
            .available_physical_devices
            .get(index)
            .ok_or(ContextError::InvalidDeviceIndex { index, count })?;

        let surface = self.surface;
        let roles = QueueRoles::new(
            needs_graphics,
            needs_compute,
            surface != vk::SurfaceKHR::null(),
        );
        let mut cached = self
            .queue_family_cache
            .get(&physical_device)
            .copied()
            .unwrap_or_default();

        let resolved = match cached.lookup(roles) {
            CacheLookup::Resolved(indices) => Ok(indices),
            CacheLookup::KnownMissing(missing) => Err(ResolveError::MissingRoles(missing)),
            CacheLookup::Unresolved => {
                let families = unsafe {
                    instance.get_physical_device_queue_family_properties(physical_device)
                };
                let surface_loader = self.surface_loader.as_ref();
                let scanned = scan_queue_families(&families, roles, |family| {
                    match surface_loader {
                        Some(loader) => unsafe {
                            loader.get_physical_device_surface_support(
                                physical_device,
                                family,
                                surface,
                            )
                        },
                        None => Ok(false),
                    }
                });

                match scanned {
                    Ok(found) => {
                        cached.record(roles, &found);
                        let missing = found.missing(roles);
                        if missing.any() {
                            Err(ResolveError::MissingRoles(missing))
                        } else {
                            Ok(found)
                        }
                    }
                    Err(ResolveError::NoQueueFamilies) => {
                        cached.record_failure(roles);
                        Err(ResolveError::NoQueueFamilies)
                    }
                    // Surface queries can fail transiently, so nothing is remembered
                    Err(err) => Err(err),
                }
            }
        };
        self.queue_family_cache.insert(physical_device, cached);

        let indices = resolved.map_err(|source| {
            report(
                "Selecting a physical device",
                ContextError::QueueFamilyResolution { index, source },
            )
        })?;

        if self.physical_device != physical_device {
            self.available_surface_formats.clear();
        }
        self.physical_device = physical_device;
        self.queue_families = indices.restricted_to(roles);
        log::info!(
            "Selected physical device {} (graphics: {:?}, compute: {:?}, presentation: {:?})",
            index,
            self.queue_families.graphics,
            self.queue_families.compute,
            self.queue_families.presentation,
        );
        Ok(())
    }

    /// Creates the logical device on the selected physical device with one queue per
    /// distinct resolved family, every supported feature, and the registered extensions.
    pub fn create_device(&mut self, flags: vk::DeviceCreateFlags) -> ContextResult<()> {
        if self.device.is_some() {
            log::warn!("Logical device already exists");
            return Ok(());
        }
        if self.instance.is_none() {
            return Err(ContextError::NoInstance);
        }
        if self.physical_device == vk::PhysicalDevice::null() {
            return Err(ContextError::NoPhysicalDevice);
        }

        #[cfg(target_os = "macos")]
        self.add_device_extension(ash::khr::portability_subset::NAME);

        let instance = self.instance.as_ref().ok_or(ContextError::NoInstance)?;
        let physical_device = self.physical_device;

        let queue_create_infos = queue_create_infos(&self.queue_families, &QUEUE_PRIORITIES);
        let enabled_extension_names = self.device_extensions.as_ptrs();
        let enabled_features = unsafe { instance.get_physical_device_features(physical_device) };

        let device_create_info = vk::DeviceCreateInfo::default()
            .flags(flags)
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .map_err(|result| {
                report("Creating the logical device", ContextError::DeviceCreation(result))
            })?;

        self.queues = Queues::retrieve(&device, &self.queue_families);
        self.physical_device_properties =
            unsafe { instance.get_physical_device_properties(physical_device) };
        self.physical_device_memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        self.swapchain_loader = Some(ash::khr::swapchain::Device::new(instance, &device));
        self.device = Some(device);

        log::info!("Using device: {}", device_name(&self.physical_device_properties));
        self.notify(LifecycleEvent::DeviceCreated);
        Ok(())
    }

    /// Tears down the swapchain and logical device, then creates the device again.
    ///
    /// Listeners see the swapchain and device destruction followed by device creation.
    /// The swapchain is not rebuilt.
    pub fn recreate_device(&mut self, flags: vk::DeviceCreateFlags) -> ContextResult<()> {
        if self.device.is_none() {
            return Err(ContextError::NoDevice);
        }
        self.wait_idle()?;

        self.destroy_swapchain();
        self.destroy_device();
        self.create_device(flags)
    }

    pub(crate) fn destroy_device(&mut self) {
        if self.device.is_none() {
            return;
        }
        self.notify(LifecycleEvent::DeviceDestroyed);

        self.swapchain_loader = None;
        self.queues = Queues::default();
        if let Some(device) = self.device.take() {
            unsafe {
                device.destroy_device(None);
            }
        }
    }
}

/// One create info per distinct family index, each asking for a single queue
pub fn queue_create_infos<'a>(
    indices: &QueueFamilyIndices,
    priorities: &'a [f32],
) -> SmallVec<[vk::DeviceQueueCreateInfo<'a>; 3]> {
    indices
        .distinct()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect()
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from("<unnamed>"))
}
