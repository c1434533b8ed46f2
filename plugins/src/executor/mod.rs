pub mod command;
pub mod renderers;

pub use command::{CommandExecutor, ShellOutput};
pub use renderers::{JsonlRendererPlugin, TextRendererPlugin};
