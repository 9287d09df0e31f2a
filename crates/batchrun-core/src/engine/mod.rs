pub(crate) mod dispatch;
pub mod invoke;
pub mod runner;

pub use invoke::{ResultProcessor, TaskFn};
pub use runner::{ExecuteOptions, Runner};
