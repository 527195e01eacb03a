//! Helpers for building Java values from native data

pub mod strings;

pub use strings::new_string_array;
