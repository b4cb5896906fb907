pub mod app;
pub mod ui;

pub use app::{parse_line, Command, ConsoleApp};
pub use ui::{format_message, render_update, role_label};
