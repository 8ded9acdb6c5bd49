//! Editable directory tree on top of a flat media catalog.
//!
//! The server half ([`service`], [`server`]) mutates the content root and keeps catalog records
//! pointing at the right files. The client half ([`client`]) is the observable tree model that
//! drives those mutations.

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod paths;
pub mod reconcile;
pub mod scan;
pub mod server;
pub mod service;
