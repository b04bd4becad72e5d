//! Batch installer for Windows applications driven through `winget`.

pub mod catalog;
pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod elevate;
pub mod install;
pub mod logging;
pub mod profiles;
pub mod ui;
pub mod winget;
