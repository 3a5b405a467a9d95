#![doc = "settlement-sync-core: reconciliation and idempotent ingestion of settlement statements."]

//! This crate contains the data model, the collaborator interfaces and the pipeline that
//! decides which statement files to load and drives each one through
//! fetch → parse → validate → persist → archive.
//! Transport, archive directory and database implementations are not included here; see
//! the `settlement-sync` crate.
//!
//! # Usage
//! Build a [`config::SyncConfig`], wire the six collaborators into a
//! [`synchronise::Collaborators`] and call [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod error;
pub mod reconcile;
pub mod staging;
pub mod statement;
pub mod synchronise;
pub mod validate;
