//! Shared helpers: the error taxonomy and string utilities.

pub mod errors;
pub mod string_utils;

pub use errors::CrewError;
