pub mod bootstrap;
pub mod runner;

pub use bootstrap::{build_services, AppServices};
pub use runner::run_to_completion;
