pub mod cli;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;

#[cfg(test)]
mod test_support;


pub use decoder::{open, Decoder, FrameReceiver};
pub use error::*;
pub use models::*;
