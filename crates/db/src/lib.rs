mod catalog;
mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use catalog::*;
pub use error::*;
pub use pool::*;
pub use repositories::*;
