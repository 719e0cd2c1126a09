//! Infrastructure layer (adapters/implementations).
//!
//! This module contains the diff engine primitives, editor buffers,
//! configuration and the `git`/`gh` process integrations.

pub mod app_config;
pub mod diff;
pub mod editor;
pub mod shell;
pub mod vcs;
