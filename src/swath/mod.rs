pub mod decoded;
pub mod reader;
pub mod store;
