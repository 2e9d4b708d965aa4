//! # Engine Module
//!
//! Store implementation.
//!
//! This module contains the core building blocks:
//! - Identifiers, signatures and event kinds
//! - Component registry and column storage
//! - Entity allocation and archetype tables
//! - Command queue and observer dispatch
//! - Queries with change cursors
//! - Systems and the sequential schedule
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod component;
pub mod storage;
pub mod entity;
pub mod archetype;
pub mod commands;
pub mod observer;
pub mod query;
pub mod manager;
pub mod systems;
