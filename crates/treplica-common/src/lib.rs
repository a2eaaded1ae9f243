pub mod error;
pub mod id;
pub mod suffix;

pub use error::*;
pub use id::*;
pub use suffix::*;
