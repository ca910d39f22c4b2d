pub mod domain;
mod error;

pub use domain::connector::*;
pub use domain::container::*;
pub use domain::scenario::*;
pub use domain::solution::*;
pub use domain::workspace::*;
pub use error::*;
