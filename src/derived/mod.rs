//! Read-only stores computed from other stores.

mod derived;
mod getter;

pub use derived::{derive, DerivedStore};
pub use getter::Getter;
