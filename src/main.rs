mod app;

use color_eyre::Result;
use winit::event_loop::EventLoop;

use app::App;
use vkboot::renderer::{ContextConfig, WindowConfig};

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let event_loop = EventLoop::new()?;
    let mut app = App::new(ContextConfig::default(), WindowConfig::default());
    event_loop.run_app(&mut app)?;

    match app.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
