use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown scenario state: {0}")]
    UnknownState(String),
}
