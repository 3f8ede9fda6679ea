use std::ffi::{c_void, CStr, CString};

use ash::vk;

use crate::renderer::core::context::ResourceContext;
use crate::renderer::core::error::{report, ContextError, ContextResult};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub(crate) struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl ResourceContext {
    pub fn add_instance_layer(&mut self, layer: &CStr) {
        self.instance_layers.add(layer);
    }

    pub fn add_instance_extension(&mut self, extension: &CStr) {
        self.instance_extensions.add(extension);
    }

    /// Loads the Vulkan library on first use
    pub fn load_entry(&mut self) -> ContextResult<&ash::Entry> {
        let entry = match self.entry.take() {
            Some(entry) => entry,
            None => unsafe { ash::Entry::load() }
                .map_err(|err| report("Loading the Vulkan library", err.into()))?,
        };
        Ok(self.entry.insert(entry))
    }

    /// Raises the requested API version to the newest one the loader supports.
    ///
    /// Vulkan 1.0 loaders lack the query; the requested version is kept then.
    pub fn use_latest_version(&mut self) -> ContextResult<u32> {
        let entry = self.load_entry()?;
        let version = unsafe { entry.try_enumerate_instance_version() }.map_err(|result| {
            report(
                "Querying the instance version",
                ContextError::Enumeration {
                    what: "the instance version",
                    result,
                },
            )
        })?;
        if let Some(version) = version {
            self.api_version = version;
        }
        Ok(self.api_version)
    }

    /// Returns the requested layers the loader does not provide
    pub fn check_instance_layers(&mut self, layers: &[&CStr]) -> ContextResult<Vec<CString>> {
        let entry = self.load_entry()?;
        let available = unsafe { entry.enumerate_instance_layer_properties() }.map_err(|result| {
            report(
                "Enumerating instance layers",
                ContextError::Enumeration {
                    what: "instance layers",
                    result,
                },
            )
        })?;

        let missing = layers
            .iter()
            .filter(|layer| {
                !available
                    .iter()
                    .filter_map(|props| props.layer_name_as_c_str().ok())
                    .any(|name| name == **layer)
            })
            .map(|layer| (*layer).to_owned())
            .collect::<Vec<_>>();
        for layer in &missing {
            log::warn!("Instance layer {:?} not found", layer);
        }
        Ok(missing)
    }

    /// Returns the requested extensions the loader (or the given layer) does not provide
    pub fn check_instance_extensions(
        &mut self,
        extensions: &[&CStr],
        layer: Option<&CStr>,
    ) -> ContextResult<Vec<CString>> {
        let entry = self.load_entry()?;
        let available = unsafe { entry.enumerate_instance_extension_properties(layer) }
            .map_err(|result| {
                report(
                    "Enumerating instance extensions",
                    ContextError::Enumeration {
                        what: "instance extensions",
                        result,
                    },
                )
            })?;

        let missing = extensions
            .iter()
            .filter(|ext| {
                !available
                    .iter()
                    .filter_map(|props| props.extension_name_as_c_str().ok())
                    .any(|name| name == **ext)
            })
            .map(|ext| (*ext).to_owned())
            .collect::<Vec<_>>();
        for ext in &missing {
            log::warn!("Instance extension {:?} not found", ext);
        }
        Ok(missing)
    }

    /// Whether the validation layer and the debug utils extension can both be enabled.
    /// The extension may come from the loader or from the layer itself.
    fn validation_available(&mut self) -> ContextResult<bool> {
        let missing_layers = self.check_instance_layers(&[VALIDATION_LAYER])?;
        let debug_utils = [ash::ext::debug_utils::NAME];
        let available = missing_layers.is_empty()
            && (self.check_instance_extensions(&debug_utils, None)?.is_empty()
                || self
                    .check_instance_extensions(&debug_utils, Some(VALIDATION_LAYER))?
                    .is_empty());
        if !available {
            log::warn!("Validation requested but unavailable, continuing without it");
        }
        Ok(available)
    }

    /// Creates the Vulkan instance from the registered layers and extensions.
    ///
    /// With validation enabled and installed, the Khronos validation layer and debug utils
    /// extension are registered first and a debug messenger is attached right after
    /// creation. Missing validation support or a messenger that cannot be created is logged
    /// and otherwise ignored.
    pub fn create_instance(&mut self, flags: vk::InstanceCreateFlags) -> ContextResult<()> {
        if self.instance.is_some() {
            log::warn!("Vulkan instance already exists");
            return Ok(());
        }

        let validation = self.config.enable_validation && self.validation_available()?;
        if validation {
            self.add_instance_layer(VALIDATION_LAYER);
            self.add_instance_extension(ash::ext::debug_utils::NAME);
        }

        #[cfg(target_os = "macos")]
        let flags = {
            self.add_instance_extension(ash::khr::portability_enumeration::NAME);
            self.add_instance_extension(ash::khr::get_physical_device_properties2::NAME);
            flags | vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        };

        if let Err(err) = self.use_latest_version() {
            log::warn!("Keeping requested API version: {}", err);
        }

        let entry = self.load_entry()?.clone();
        let application_info = vk::ApplicationInfo::default()
            .api_version(self.api_version);
        let enabled_layer_names = self.instance_layers.as_ptrs();
        let enabled_extension_names = self.instance_extensions.as_ptrs();
        let mut debug_info = debug_utils_messenger_create_info();
        let mut instance_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);
        if validation {
            instance_info = instance_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&instance_info, None) }.map_err(|result| {
            report("Creating the Vulkan instance", ContextError::InstanceCreation(result))
        })?;

        log::info!(
            "Vulkan API version: {}.{}.{}",
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        );

        if validation {
            self.debug_messenger = create_debug_messenger(&entry, &instance);
        }
        self.instance = Some(instance);

        Ok(())
    }

    pub(crate) fn destroy_debug_messenger(&mut self) {
        let Some(messenger) = self.debug_messenger.take() else {
            return;
        };
        let (Some(entry), Some(instance)) = (self.entry.as_ref(), self.instance.as_ref()) else {
            return;
        };

        let destroy = unsafe {
            entry.get_instance_proc_addr(
                instance.handle(),
                c"vkDestroyDebugUtilsMessengerEXT".as_ptr(),
            )
        };
        if destroy.is_none() {
            log::warn!("vkDestroyDebugUtilsMessengerEXT is unavailable, debug messenger leaked");
            return;
        }
        unsafe {
            messenger
                .loader
                .destroy_debug_utils_messenger(messenger.handle, None);
        }
    }
}

fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Option<DebugMessenger> {
    let create = unsafe {
        entry.get_instance_proc_addr(
            instance.handle(),
            c"vkCreateDebugUtilsMessengerEXT".as_ptr(),
        )
    };
    if create.is_none() {
        log::error!("Failed to get the function pointer of vkCreateDebugUtilsMessengerEXT");
        return None;
    }

    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let debug_utils_info = debug_utils_messenger_create_info();
    match unsafe { loader.create_debug_utils_messenger(&debug_utils_info, None) } {
        Ok(handle) => Some(DebugMessenger { loader, handle }),
        Err(result) => {
            log::error!("Failed to create a debug messenger: {}", result);
            None
        }
    }
}

fn debug_utils_messenger_create_info(
) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_severity = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    if p_callback_data.is_null() || unsafe { (*p_callback_data).p_message.is_null() } {
        return vk::FALSE;
    }
    let msg = unsafe {
        CStr::from_ptr((*p_callback_data).p_message)
    };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            log::trace!("[Verbose]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Warning]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Error]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Info]{} {:?}", msg_type, msg);
        }
        _ => {
            log::warn!("[Unknown]{} {:?}", msg_type, msg);
        }
    }

    // Must be FALSE; TRUE is reserved for layer development
    vk::FALSE
}
