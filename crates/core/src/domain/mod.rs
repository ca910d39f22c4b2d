pub mod connector;
pub mod container;
pub mod scenario;
pub mod solution;
pub mod workspace;
