pub mod config;
pub mod error;
pub mod ratio;
pub mod stats;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use ratio::*;
pub use traits::*;
pub use types::*;
