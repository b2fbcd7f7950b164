//! Finite-element stiffness assembly for the 2D Poisson/heat-conduction
//! operator on unstructured triangular meshes, plus a 1D explicit heat
//! diffusion stepper.

pub mod assembler;
pub mod config;
pub mod datatypes;
pub mod domain;
pub mod error;
pub mod grid;
pub mod heat1d;
pub mod logging;
pub mod report;

pub use assembler::{AssemblyObserver, KijDumpObserver, ProgressObserver, StiffnessAssembler};
pub use datatypes::{DomainExtents, Element, ModelMetadata, Node, Vertex};
pub use error::FegridError;
pub use grid::FeGrid;
