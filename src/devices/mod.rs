//! Device Variants
//!
//! One module per supported instrument model. Each implements
//! [`Device`](crate::session::Device) on top of the shared session engine.

pub mod gmh3710;

pub use gmh3710::{Gmh3710, Gmh3710Handler};
