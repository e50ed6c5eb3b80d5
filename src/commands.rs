mod check;
mod demo;

pub use check::run_config_check;
pub use demo::{run_demo, DemoReport};
