mod scenario;

pub use scenario::ScenarioRow;
