//! CLI Commands

pub mod aggregate;
pub mod serve;
pub mod status;
pub mod vet;
