//! Instance key loading

pub mod provider;

pub use provider::KeyProvider;
