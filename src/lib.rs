//! Shared wire types, errors and helpers for the CRM ML inference service.

pub mod dto;
pub mod error;
pub mod response;
pub mod util;
