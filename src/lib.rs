//! Interactive swath bathymetry editing: footprint-weighted gridding that follows sounding
//! edits, an edit log compatible with `.esf` files, and bias calibration from selections.

pub mod calibration;
pub mod config;
pub mod edits;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod gridding;
pub mod projection;
pub mod selection;
pub mod session;
pub mod swath;
pub mod utils;

pub use config::SessionConfig;
pub use error::SwathEditError;
pub use session::{EditorSession, FlushPolicy, NullObserver, SessionObserver};
