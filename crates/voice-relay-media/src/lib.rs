//! Audio handling: WAV helpers and the on-disk audio store.

pub mod store;
pub mod wav;

pub use store::{AudioKind, AudioRef, AudioStore, RetentionPolicy, SweepReport};
