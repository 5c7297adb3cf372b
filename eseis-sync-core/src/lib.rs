#![doc = "eseis-sync-core: incremental synchronisation engine for eseis-sync."]

//! This crate holds the REST client, token lifecycle, pagination, idempotent
//! export, browser snapshot pipeline and the traversal that ties them together.
//! Command-line parsing and environment loading live in the `eseis-sync` crate.
//!
//! # Usage
//! Build an [`api::EseisClient`], optionally a [`snapshot::SnapshotSession`]
//! over a [`browser::ChromeBrowser`], and hand both to
//! [`synchronise::Synchroniser`].

pub mod api;
pub mod auth;
pub mod browser;
pub mod config;
pub mod contract;
pub mod error;
pub mod export;
pub mod model;
pub mod paginate;
pub mod paths;
pub mod snapshot;
pub mod synchronise;
