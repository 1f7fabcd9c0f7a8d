//! File-mediated control by an external process
//!
//! The controller writes commands into per-light inboxes and reads back status
//! snapshots. Files are the only thing shared with it: commands are applied at
//! most once in timestamp order, and snapshots are replaced atomically.

mod atomic;
mod chaos;
mod channel;
mod command;
mod config;
mod publisher;
mod watermark;

pub use atomic::{temp_path_for, write_atomic};
pub use chaos::{ChaosOverride, ChaosStep};
pub use channel::{CommandChannel, PendingCommand, Target};
pub use command::{Action, Command, CommandError, CommandFile, LightCommand, ManagerCommand};
pub use config::{ApiPaths, ControlConfig, COMMAND_FILE_SUFFIX, WATERMARK_FILE_SUFFIX};
pub use publisher::{LightSnapshot, StatusPublisher, SystemSnapshot};
pub use watermark::WatermarkStore;
