//! Blueprint Client - HTTP clients for the mod catalogs
//!
//! This crate provides HTTP clients for:
//!
//! - [`curseforge`] - the CurseForge v1 API (requires an API key)
//! - [`modrinth`] - the Modrinth v2 API
//!
//! # Overview
//!
//! Both clients retry with exponential backoff when the catalog answers
//! HTTP 429, and implement [`blueprint_core::AddonCatalog`] so the scanner
//! can page through them without knowing which is which.

pub mod curseforge;
pub mod modrinth;

mod http;

pub use curseforge::CurseForgeClient;
pub use modrinth::ModrinthClient;
