pub mod bounds;
pub mod grid;
pub mod weight;
