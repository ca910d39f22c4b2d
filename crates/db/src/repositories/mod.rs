mod in_memory_scenario_repository;
mod scenario_repository;

pub use in_memory_scenario_repository::*;
pub use scenario_repository::*;
