use thiserror::Error;

#[derive(Debug, Error)]
pub enum FegridError {
    /// Bad command line or configuration values
    #[error("Input error: {0}")]
    Input(String),

    /// Missing, unreadable or malformed node/element tables
    #[error("Mesh load error: {0}")]
    MeshLoad(String),

    /// A triangle whose vertices are collinear
    #[error("Degenerate element {element}: signed double area is {det}")]
    DegenerateElement { element: usize, det: f64 },

    /// Failure to write a report or coordinate file
    #[error("Report error: {0}")]
    Report(String),
}
