use ash::vk;

/// Options for the resource context: requested API version, validation, device and queue
/// selection, and presentation policy
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Requested API version, upgraded to the loader's latest when it can report one
    pub api_version: u32,
    pub enable_validation: bool,
    /// Picks FIFO presentation; when false, MAILBOX is used if available
    pub limit_frame_rate: bool,
    pub device_index: usize,
    pub enable_graphics_queue: bool,
    pub enable_compute_queue: bool,
    /// Swapchain extent used when the surface leaves the size to the application
    pub fallback_extent: vk::Extent2D,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            api_version: vk::API_VERSION_1_0,
            enable_validation: cfg!(debug_assertions),
            limit_frame_rate: true,
            device_index: 0,
            enable_graphics_queue: true,
            enable_compute_queue: false,
            fallback_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
        }
    }
}

/// Contains configuration options for the window like the title, size, and fullscreen mode
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: String::from("vkboot"),
            width: 1280,
            height: 720,
            fullscreen: false,
            resizable: true,
        }
    }
}
