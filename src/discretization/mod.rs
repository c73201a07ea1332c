pub mod generator;
pub mod graph;
pub mod mesh;
pub mod reader;
