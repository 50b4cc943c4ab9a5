#![doc = "sbom-harvest-core: discovery and SBOM pipeline library for sbom-harvest."]

//! Discovers the repositories of an organization, then drives each through
//! probe, clone, SBOM generation, project registration and upload on a
//! bounded worker pool.
//!
//! # Usage
//! Build a [`worker::Collaborators`] from the concrete clients in [`github`],
//! [`tracking`] and [`tools`] (or from the `Mock*` doubles in [`contract`]) and
//! hand it to [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod github;
pub mod http;
pub mod session;
pub mod stages;
pub mod stats;
pub mod synchronise;
pub mod tools;
pub mod tracking;
pub mod worker;
