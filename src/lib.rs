pub mod animation;
pub mod columns;
pub mod config;
pub mod error;
pub mod model;
pub mod player;
pub mod segment;
pub mod settings;
pub mod skeleton;

pub use error::{Error, FailureKind, Result};
