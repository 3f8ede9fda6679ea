/// "Core" owns the Vulkan objects every other part of an application builds on: the
/// instance, the selected physical device, the logical device and its queues, the surface
/// and the swapchain.

pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod listener;
pub mod queue;
pub mod registry;
pub mod swapchain;
pub mod sync;

pub use context::ResourceContext;
pub use error::{fatal, ContextError, ContextResult, FatalError};
pub use listener::{ContextListener, ListenerToken};
pub use queue::{Queue, QueueFamilyIndices, QueueRoles, Queues};
pub use swapchain::{RecreateOutcome, SwapchainParams};
pub use sync::{Fence, Semaphore};
