//! Release and deployment dashboard client.
//!
//! A [`cascade::Dashboard`] owns the user's selection (project, release,
//! pipeline, release run) and keeps one cancellable, selection-scoped query
//! per view. Responses are normalized, merged and aggregated into
//! display-ready data that stays consistent with the latest selection.

pub mod aggregate;
pub mod api;
pub mod auth;
pub mod cascade;
pub mod config;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod query;

#[cfg(test)]
mod testing;
