pub mod types;
pub mod event;
pub mod error;

pub use types::*;
pub use event::*;
pub use error::*;
