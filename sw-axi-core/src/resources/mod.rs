//! Provides ready-made software slaves.

pub mod ram;
