// Core module: shared types, error taxonomy and packet codec (NO I/O dependencies)
pub mod types;
pub mod error;
pub mod codec;

pub use types::*;
pub use error::*;
pub use codec::*;
