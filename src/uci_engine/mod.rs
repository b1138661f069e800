pub mod client;
pub mod options;

pub use client::{EngineError, UciEngine};
pub use options::load_uci_options;
