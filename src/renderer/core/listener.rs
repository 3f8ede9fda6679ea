use crate::renderer::core::context::ResourceContext;

/// Observer of the device and swapchain lifecycle.
///
/// Dependents that own GPU objects derived from the device or swapchain (framebuffers,
/// pipelines, descriptor sets) implement this to rebuild or release them. Destruction
/// notifications arrive while the handles they refer to are still valid.
pub trait ContextListener {
    fn on_device_created(&mut self, _ctx: &ResourceContext) {}
    fn on_device_destroyed(&mut self, _ctx: &ResourceContext) {}
    fn on_swapchain_created(&mut self, _ctx: &ResourceContext) {}
    fn on_swapchain_destroyed(&mut self, _ctx: &ResourceContext) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    DeviceCreated,
    DeviceDestroyed,
    SwapchainCreated,
    SwapchainDestroyed,
}

/// Handle returned on registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Entry = (ListenerToken, Box<dyn ContextListener>);

#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Listeners {
    pub fn register(&mut self, listener: Box<dyn ContextListener>) -> ListenerToken {
        let token = ListenerToken(self.next_id);
        self.next_id += 1;
        self.entries.push((token, listener));
        token
    }

    pub fn unregister(&mut self, token: ListenerToken) -> Option<Box<dyn ContextListener>> {
        let position = self.entries.iter().position(|(t, _)| *t == token)?;
        Some(self.entries.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn take_entries(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn restore_entries(&mut self, mut entries: Vec<Entry>) {
        entries.append(&mut self.entries);
        self.entries = entries;
    }
}

pub(crate) fn dispatch(entries: &mut [Entry], event: LifecycleEvent, ctx: &ResourceContext) {
    for (_, listener) in entries.iter_mut() {
        match event {
            LifecycleEvent::DeviceCreated => listener.on_device_created(ctx),
            LifecycleEvent::DeviceDestroyed => listener.on_device_destroyed(ctx),
            LifecycleEvent::SwapchainCreated => listener.on_swapchain_created(ctx),
            LifecycleEvent::SwapchainDestroyed => listener.on_swapchain_destroyed(ctx),
        }
    }
}
