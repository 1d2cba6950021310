//! Client for the dashboard backend's query endpoints.

mod core;
mod endpoints;
mod overview;
mod source;

pub use self::core::ApiClient;
pub use endpoints::{ApiRequest, Endpoint, ReleaseSource};
pub use overview::{collect_release_overview, ReleaseOverview};
pub use source::DashboardSource;
