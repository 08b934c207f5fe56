//! Shared wire models and configuration for the Unify chat client.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod models;
