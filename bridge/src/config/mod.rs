mod loader;
mod types;
mod watcher;

pub use loader::load;
pub use types::*;
pub use watcher::watch_config_file;
