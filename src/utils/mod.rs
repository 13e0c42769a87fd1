pub mod constants;
pub mod coords;
pub mod interp;
pub mod time;
