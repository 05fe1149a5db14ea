pub mod cluster;
pub mod incident;

pub use cluster::*;
pub use incident::*;
