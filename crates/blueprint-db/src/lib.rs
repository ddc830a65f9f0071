//! Blueprint DB - persistence adapters
//!
//! - [`appwrite`] - documents, users and teams over the Appwrite REST API
//! - [`meili`] - search indexes over Meilisearch
//!
//! Both implement the service traits from [`blueprint_core::store`], so the
//! function logic never talks to either backend directly.

pub mod appwrite;
pub mod meili;

pub use appwrite::{AppwriteClient, AppwriteDatabase, AppwriteTeams};
pub use meili::MeiliIndexer;
