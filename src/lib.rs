//! Core library of the rankeval human-evaluation platform: HIT import and
//! storage, task assignment, result collection and the export/aggregation
//! pipeline used to produce WMT-style CSV files and inter-annotator
//! agreement scores.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod allocate;
pub mod config;
pub mod export;
pub mod hits;
pub mod languages;
pub mod projects;
pub mod results;
pub mod schema;
pub mod state;
pub mod status;
pub mod users;
pub mod validation;

#[cfg(test)]
pub mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
