//! `reminderd`: scheduled-block reminders for a directory of Markdown or Org
//! notes, built on [`reminder_core`].

pub mod commands;
pub mod config;
pub mod daemon;
pub mod notes;
pub mod settings_file;
pub mod sinks;
pub mod watch;

pub use crate::config::AppConfig;
pub use crate::daemon::{run, Daemon};
