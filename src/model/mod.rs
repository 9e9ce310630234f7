pub mod collection;
pub mod config;
pub mod note;

pub use collection::*;
pub use config::*;
pub use note::*;
