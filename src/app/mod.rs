mod fps;

use std::ffi::CStr;
use std::time::Instant;

use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::{Report, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};

use vkboot::renderer::core::RecreateOutcome;
use vkboot::renderer::{ContextConfig, ResourceContext, WindowConfig};

use crate::app::fps::FpsCounter;

pub struct App {
    context_config: ContextConfig,
    window_config: WindowConfig,

    // The context is declared before the window so it is dropped first
    context: Option<ResourceContext>,
    window: Option<Window>,

    fps: FpsCounter,
    error: Option<Report>,
    close_requested: bool,
}

impl App {
    pub fn new(context_config: ContextConfig, window_config: WindowConfig) -> Self {
        Self {
            context_config,
            window_config,
            context: None,
            window: None,
            fps: FpsCounter::new(Instant::now()),
            error: None,
            close_requested: false,
        }
    }

    /// Error that stopped the event loop, if any
    pub fn take_error(&mut self) -> Option<Report> {
        self.error.take()
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Window> {
        let config = &self.window_config;
        let mut attributes = Window::default_attributes()
            .with_title(config.title.as_str())
            .with_resizable(config.resizable);
        attributes = if config.fullscreen {
            attributes.with_fullscreen(Some(Fullscreen::Borderless(None)))
        } else {
            attributes.with_inner_size(PhysicalSize::new(config.width, config.height))
        };
        Ok(event_loop.create_window(attributes)?)
    }

    /// Runs the full bootstrap: instance, surface, device and swapchain
    fn create_context(&self, window: &Window) -> Result<ResourceContext> {
        let config = &self.context_config;
        let mut ctx = ResourceContext::new(config.clone());

        let display_handle = window.display_handle()?.as_raw();
        for ext in ash_window::enumerate_required_extensions(display_handle)? {
            ctx.add_instance_extension(unsafe { CStr::from_ptr(*ext) });
        }
        ctx.add_device_extension(ash::khr::swapchain::NAME);
        ctx.create_instance(vk::InstanceCreateFlags::empty())?;

        let surface = {
            let entry = ctx.entry().ok_or_eyre("Vulkan library not loaded")?;
            let instance = ctx.instance().ok_or_eyre("Vulkan instance missing")?;
            unsafe {
                ash_window::create_surface(
                    entry,
                    instance,
                    display_handle,
                    window.window_handle()?.as_raw(),
                    None,
                )?
            }
        };
        ctx.attach_surface(surface)?;
        ctx.set_drawable_extent(drawable_extent(window.inner_size()));

        ctx.enumerate_physical_devices()?;
        ctx.select_physical_device(
            config.device_index,
            config.enable_graphics_queue,
            config.enable_compute_queue,
        )?;
        ctx.create_device(vk::DeviceCreateFlags::empty())?;
        ctx.create_swapchain(config.limit_frame_rate, vk::SwapchainCreateFlagsKHR::empty())?;

        Ok(ctx)
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        ctx.set_drawable_extent(drawable_extent(size));
        match ctx.recreate_swapchain() {
            Ok(RecreateOutcome::Recreated) => {}
            Ok(RecreateOutcome::Deferred) => {
                log::debug!("Resize to {}x{} deferred", size.width, size.height)
            }
            Err(err) => log::error!("Failed to resize the swapchain: {}", err),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("{:#}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(mut ctx) = self.context.take() {
            ctx.destroy();
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(err) => return self.fail(event_loop, err),
        };
        match self.create_context(&window) {
            Ok(ctx) => self.context = Some(ctx),
            Err(err) => return self.fail(event_loop, err),
        }
        self.window = Some(window);
        self.fps = FpsCounter::new(Instant::now());
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(Window::id) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                self.resize(size);
            }
            WindowEvent::RedrawRequested => {
                let fps = self.fps.tick(Instant::now());
                if let (Some(fps), Some(window)) = (fps, self.window.as_ref()) {
                    window.set_title(&format!("{} - {:.0} FPS", self.window_config.title, fps));
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn drawable_extent(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
