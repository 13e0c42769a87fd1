pub mod attitude;
pub mod corrector;
pub mod footprint;
