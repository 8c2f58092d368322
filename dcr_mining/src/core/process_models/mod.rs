//! Process models
pub mod dcr;
