pub mod build;
pub mod concat;
pub mod node;
