use ash::prelude::VkResult;
use ash::vk;

use crate::renderer::core::context::ResourceContext;
use crate::renderer::core::error::{
    fatal, report, require_any, ContextError, ContextResult, FatalError,
};
use crate::renderer::core::listener::LifecycleEvent;

/// Everything needed to build a swapchain again, captured when it was first created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapchainParams {
    pub flags: vk::SwapchainCreateFlagsKHR,
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub image_extent: vk::Extent2D,
    pub image_array_layers: u32,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    pub clipped: bool,
}

impl SwapchainParams {
    /// Images are shared concurrently when more than one queue family is given
    pub fn create_info<'a>(
        &self,
        surface: vk::SurfaceKHR,
        old_swapchain: vk::SwapchainKHR,
        queue_family_indices: &'a [u32],
    ) -> vk::SwapchainCreateInfoKHR<'a> {
        let info = vk::SwapchainCreateInfoKHR::default()
            .flags(self.flags)
            .surface(surface)
            .min_image_count(self.min_image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.image_extent)
            .image_array_layers(self.image_array_layers)
            .image_usage(self.image_usage)
            .pre_transform(self.pre_transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(self.present_mode)
            .clipped(self.clipped)
            .old_swapchain(old_swapchain);

        if queue_family_indices.len() > 1 {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices)
        } else {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        }
    }
}

#[derive(Default)]
pub(crate) struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub params: SwapchainParams,
    /// Format picked through `set_surface_format`, kept across recreation
    pub chosen_format: Option<vk::SurfaceFormatKHR>,
    /// The handle was passed as `old_swapchain` to a creation that failed. The driver
    /// retired it anyway, so it must not be chained again.
    pub retired: bool,
}

impl SwapchainState {
    pub fn is_live(&self) -> bool {
        self.handle != vk::SwapchainKHR::null()
    }

    /// Swapchain to pass as `old_swapchain` for the next rebuild
    pub fn chain_target(&self) -> vk::SwapchainKHR {
        if self.retired {
            vk::SwapchainKHR::null()
        } else {
            self.handle
        }
    }

    /// Parameters for a rebuild at `extent`, picking up a pending format choice
    pub fn rebuild_params(&self, extent: vk::Extent2D) -> SwapchainParams {
        SwapchainParams {
            image_extent: extent,
            surface_format: self.chosen_format.unwrap_or(self.params.surface_format),
            ..self.params
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    Recreated,
    /// The surface has no usable size right now (e.g. a minimized window); nothing changed
    Deferred,
}

/// One image above the minimum whenever the surface advertises a maximum
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    caps.min_image_count + u32::from(caps.max_image_count > 0)
}

pub fn image_extent(caps: &vk::SurfaceCapabilitiesKHR, fallback: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: fallback
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: fallback
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Extent to rebuild with, or `None` when the surface currently reports no usable size
pub fn recreate_extent(caps: &vk::SurfaceCapabilitiesKHR) -> Option<vk::Extent2D> {
    let extent = caps.current_extent;
    if extent.width == u32::MAX || extent.width == 0 || extent.height == 0 {
        None
    } else {
        Some(extent)
    }
}

pub fn composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    if supported.contains(vk::CompositeAlphaFlagsKHR::INHERIT) {
        return vk::CompositeAlphaFlagsKHR::INHERIT;
    }
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Color attachment plus the transfer usages the surface supports. The flag is false
/// when images cannot be a transfer destination.
pub fn image_usage(supported: vk::ImageUsageFlags) -> (vk::ImageUsageFlags, bool) {
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    if supported.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    let transfer_dst = supported.contains(vk::ImageUsageFlags::TRANSFER_DST);
    if transfer_dst {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    (usage, transfer_dst)
}

/// RGBA8 then BGRA8 in the sRGB non-linear color space, else the first available format
pub fn default_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM]
        .into_iter()
        .find_map(|format| {
            find_surface_format(
                available,
                vk::SurfaceFormatKHR {
                    format,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            )
        });
    if preferred.is_some() {
        return preferred;
    }

    let first = available.first().copied();
    if let Some(format) = first {
        log::warn!(
            "No preferred surface format available, falling back to {:?} / {:?}",
            format.format,
            format.color_space
        );
    }
    first
}

/// An `UNDEFINED` format in the candidate matches any format with the same color space
pub fn find_surface_format(
    available: &[vk::SurfaceFormatKHR],
    candidate: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    available.iter().copied().find(|format| {
        format.color_space == candidate.color_space
            && (candidate.format == vk::Format::UNDEFINED || format.format == candidate.format)
    })
}

/// FIFO is always available; MAILBOX replaces it when the frame rate is not limited
pub fn choose_present_mode(
    available: Vec<vk::PresentModeKHR>,
    limit_frame_rate: bool,
) -> Result<vk::PresentModeKHR, FatalError> {
    let available = require_any(available, FatalError::NoPresentModes)?;
    if !limit_frame_rate && available.contains(&vk::PresentModeKHR::MAILBOX) {
        return Ok(vk::PresentModeKHR::MAILBOX);
    }
    Ok(vk::PresentModeKHR::FIFO)
}

pub fn view_create_info(
    image: vk::Image,
    format: vk::Format,
) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image(image)
}

/// Creates one view per image in order and stops at the first failure. Views made before
/// the failure are returned with it so they can still be destroyed.
pub fn create_image_views<F>(
    images: &[vk::Image],
    mut create: F,
) -> (Vec<vk::ImageView>, Option<vk::Result>)
where
    F: FnMut(vk::Image) -> VkResult<vk::ImageView>,
{
    let mut views = Vec::with_capacity(images.len());
    for image in images {
        match create(*image) {
            Ok(view) => views.push(view),
            Err(result) => return (views, Some(result)),
        }
    }
    (views, None)
}

impl ResourceContext {
    pub fn swapchain(&self) -> Option<vk::SwapchainKHR> {
        self.swapchain.is_live().then_some(self.swapchain.handle)
    }

    pub fn swapchain_images(&self) -> &[vk::Image] {
        &self.swapchain.images
    }

    pub fn swapchain_image_views(&self) -> &[vk::ImageView] {
        &self.swapchain.image_views
    }

    pub fn swapchain_params(&self) -> Option<&SwapchainParams> {
        self.swapchain.is_live().then_some(&self.swapchain.params)
    }

    pub fn swapchain_loader(&self) -> Option<&ash::khr::swapchain::Device> {
        self.swapchain_loader.as_ref()
    }

    pub fn available_surface_formats(&self) -> &[vk::SurfaceFormatKHR] {
        &self.available_surface_formats
    }

    pub fn surface_capabilities(&self) -> ContextResult<vk::SurfaceCapabilitiesKHR> {
        let loader = self.surface_loader.as_ref().ok_or(ContextError::NoSurface)?;
        let surface = self.surface().ok_or(ContextError::NoSurface)?;
        let physical_device = self.physical_device().ok_or(ContextError::NoPhysicalDevice)?;
        unsafe { loader.get_physical_device_surface_capabilities(physical_device, surface) }
            .map_err(|result| {
                report(
                    "Querying surface capabilities",
                    ContextError::SurfaceCapabilities(result),
                )
            })
    }

    /// Surface formats of the selected device, queried once and cached until the surface
    /// or device changes. Aborts the process when the surface reports none.
    pub fn fetch_surface_formats(&mut self) -> ContextResult<&[vk::SurfaceFormatKHR]> {
        if self.available_surface_formats.is_empty() {
            let loader = self.surface_loader.as_ref().ok_or(ContextError::NoSurface)?;
            let surface = self.surface().ok_or(ContextError::NoSurface)?;
            let physical_device = self.physical_device().ok_or(ContextError::NoPhysicalDevice)?;
            let formats = unsafe {
                loader.get_physical_device_surface_formats(physical_device, surface)
            }
            .map_err(|result| {
                report("Querying surface formats", ContextError::SurfaceFormats(result))
            })?;

            self.available_surface_formats =
                match require_any(formats, FatalError::NoSurfaceFormats) {
                    Ok(formats) => formats,
                    Err(err) => fatal(err),
                };
        }
        Ok(&self.available_surface_formats)
    }

    /// Chooses the swapchain surface format, rebuilding a live swapchain when it changes.
    ///
    /// A candidate with an `UNDEFINED` format picks the first available format in the
    /// requested color space. [`swapchain_params`](ResourceContext::swapchain_params) keeps
    /// reporting the old format until a rebuild with the new one succeeds.
    pub fn set_surface_format(
        &mut self,
        candidate: vk::SurfaceFormatKHR,
    ) -> ContextResult<vk::SurfaceFormatKHR> {
        let available = self.fetch_surface_formats()?;
        let format = find_surface_format(available, candidate).ok_or_else(|| {
            report(
                "Setting the surface format",
                ContextError::FormatNotSupported {
                    format: candidate.format,
                    color_space: candidate.color_space,
                },
            )
        })?;

        self.swapchain.chosen_format = Some(format);
        if self.swapchain.is_live() && self.swapchain.params.surface_format != format {
            if self.recreate_swapchain()? == RecreateOutcome::Deferred {
                log::debug!("Surface format change waits for the next swapchain rebuild");
            }
        }
        Ok(format)
    }

    /// Creates the swapchain for the attached surface and notifies listeners.
    ///
    /// Image count, extent, alpha mode and usage follow the surface capabilities. Without
    /// an explicitly chosen format RGBA8 or BGRA8 sRGB is preferred. Presentation uses FIFO
    /// unless `limit_frame_rate` is false and MAILBOX is available.
    pub fn create_swapchain(
        &mut self,
        limit_frame_rate: bool,
        flags: vk::SwapchainCreateFlagsKHR,
    ) -> ContextResult<()> {
        if self.swapchain.is_live() {
            log::warn!("Swapchain already exists");
            return Ok(());
        }
        if self.device.is_none() {
            return Err(ContextError::NoDevice);
        }

        let caps = self.surface_capabilities()?;
        let (image_usage, transfer_dst) = image_usage(caps.supported_usage_flags);
        if !transfer_dst {
            log::warn!("Swapchain images cannot be used as a transfer destination");
        }

        let chosen_format = self.swapchain.chosen_format;
        let available = self.fetch_surface_formats()?;
        let surface_format = match chosen_format {
            Some(format) => Some(format),
            None => default_surface_format(available),
        }
        .ok_or(ContextError::NoSurface)?;

        let present_mode = {
            let loader = self.surface_loader.as_ref().ok_or(ContextError::NoSurface)?;
            let modes = unsafe {
                loader.get_physical_device_surface_present_modes(self.physical_device, self.surface)
            }
            .map_err(|result| {
                report("Querying present modes", ContextError::PresentModes(result))
            })?;
            match choose_present_mode(modes, limit_frame_rate) {
                Ok(mode) => mode,
                Err(err) => fatal(err),
            }
        };

        let params = SwapchainParams {
            flags,
            min_image_count: image_count(&caps),
            surface_format,
            image_extent: image_extent(&caps, self.drawable_extent),
            image_array_layers: 1,
            image_usage,
            pre_transform: caps.current_transform,
            composite_alpha: composite_alpha(caps.supported_composite_alpha),
            present_mode,
            clipped: true,
        };
        self.build_swapchain(params, vk::SwapchainKHR::null())?;

        let params = &self.swapchain.params;
        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            params.image_extent.width,
            params.image_extent.height,
            self.swapchain.images.len(),
            params.surface_format.format,
            params.present_mode,
        );
        self.notify(LifecycleEvent::SwapchainCreated);
        Ok(())
    }

    /// Rebuilds the swapchain at the surface's current size, reusing every other parameter.
    ///
    /// Returns [`RecreateOutcome::Deferred`] without touching anything when the surface has
    /// no usable size. The logical device is left alone.
    pub fn recreate_swapchain(&mut self) -> ContextResult<RecreateOutcome> {
        if !self.swapchain.is_live() {
            return Err(ContextError::NoSwapchain);
        }

        let caps = self.surface_capabilities()?;
        let Some(extent) = recreate_extent(&caps) else {
            log::debug!("Surface extent undefined, swapchain recreation deferred");
            return Ok(RecreateOutcome::Deferred);
        };
        let params = self.swapchain.rebuild_params(extent);

        self.wait_queues_idle()?;
        self.notify(LifecycleEvent::SwapchainDestroyed);
        self.destroy_image_views();

        let old_swapchain = self.swapchain.handle;
        let built = self.build_swapchain(params, self.swapchain.chain_target());
        if self.swapchain.handle != old_swapchain {
            if let Some(loader) = self.swapchain_loader.as_ref() {
                unsafe {
                    loader.destroy_swapchain(old_swapchain, None);
                }
            }
            self.swapchain.retired = false;
        } else if built.is_err() {
            // A failed vkCreateSwapchainKHR still retires its oldSwapchain
            self.swapchain.retired = true;
        }
        built?;

        log::debug!("Swapchain recreated at {}x{}", extent.width, extent.height);
        self.notify(LifecycleEvent::SwapchainCreated);
        Ok(RecreateOutcome::Recreated)
    }

    /// Waits on the graphics queue, then on the presentation queue if it is a different one
    fn wait_queues_idle(&self) -> ContextResult<()> {
        let device = self.device.as_ref().ok_or(ContextError::NoDevice)?;
        let graphics = self.queues.graphics.as_ref().map(|queue| queue.handle);
        let presentation = self.queues.presentation.as_ref().map(|queue| queue.handle);

        let mut waited = None;
        for queue in [graphics, presentation].into_iter().flatten() {
            if waited == Some(queue) {
                continue;
            }
            unsafe { device.queue_wait_idle(queue) }.map_err(|result| {
                report("Waiting for queue idle", ContextError::QueueIdleWait(result))
            })?;
            waited = Some(queue);
        }
        Ok(())
    }

    /// Creates a swapchain from `params`, replacing `old_swapchain`, and fetches its images
    /// with one view each. The caller still owns `old_swapchain`.
    ///
    /// Once the handle exists it is stored together with `params` and its images. Views
    /// created before a failing one are kept, in image order, so teardown can release them.
    fn build_swapchain(
        &mut self,
        params: SwapchainParams,
        old_swapchain: vk::SwapchainKHR,
    ) -> ContextResult<()> {
        let device = self.device.as_ref().ok_or(ContextError::NoDevice)?;
        let loader = self.swapchain_loader.as_ref().ok_or(ContextError::NoDevice)?;
        let surface = self.surface().ok_or(ContextError::NoSurface)?;

        let sharing = match (self.queue_families.graphics, self.queue_families.presentation) {
            (Some(graphics), Some(presentation)) if graphics != presentation => {
                vec![graphics, presentation]
            }
            _ => Vec::new(),
        };
        let create_info = params.create_info(surface, old_swapchain, &sharing);
        let handle = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|result| {
            report("Creating the swapchain", ContextError::SwapchainCreation(result))
        })?;
        self.swapchain.handle = handle;
        self.swapchain.params = params;
        self.swapchain.images.clear();
        self.swapchain.image_views.clear();

        let images = unsafe { loader.get_swapchain_images(handle) }.map_err(|result| {
            report("Getting swapchain images", ContextError::SwapchainImages(result))
        })?;
        self.swapchain.images = match require_any(images, FatalError::NoSwapchainImages) {
            Ok(images) => images,
            Err(err) => fatal(err),
        };

        let format = params.surface_format.format;
        let (views, failure) = create_image_views(&self.swapchain.images, |image| unsafe {
            device.create_image_view(&view_create_info(image, format), None)
        });
        self.swapchain.image_views = views;

        match failure {
            Some(result) => Err(report(
                "Creating swapchain image views",
                ContextError::ImageViewCreation(result),
            )),
            None => Ok(()),
        }
    }

    fn destroy_image_views(&mut self) {
        if let Some(device) = self.device.as_ref() {
            for view in self.swapchain.image_views.drain(..) {
                unsafe {
                    device.destroy_image_view(view, None);
                }
            }
        }
        self.swapchain.image_views.clear();
        self.swapchain.images.clear();
    }

    pub(crate) fn destroy_swapchain(&mut self) {
        if !self.swapchain.is_live() {
            return;
        }
        self.notify(LifecycleEvent::SwapchainDestroyed);
        self.destroy_image_views();

        if let Some(loader) = self.swapchain_loader.as_ref() {
            unsafe {
                loader.destroy_swapchain(self.swapchain.handle, None);
            }
        }
        self.swapchain.handle = vk::SwapchainKHR::null();
        self.swapchain.params = SwapchainParams::default();
        self.swapchain.retired = false;
    }
}
