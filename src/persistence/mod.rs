//! Durable configuration writes.

pub mod atomic;

pub use atomic::{write_atomic, AtomicFileWriter};
