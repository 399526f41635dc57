mod log_level;
mod view_mode;

pub use log_level::LogLevel;
pub use view_mode::ViewMode;
