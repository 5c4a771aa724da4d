//! Database access for the scheduler

pub mod anchor;
pub mod history;
pub mod init;
pub mod settings;
pub mod tracks;

pub use init::init_settings_defaults;
pub use settings::load_scheduler_config;
