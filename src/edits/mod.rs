pub mod error;
pub mod esf;
pub mod io;
pub mod store;
