pub mod admin;
pub mod auth;
pub mod convert;
pub mod dashboard;
pub mod error;
pub mod favorites;
pub mod images;
pub mod messages;
pub mod middleware;
pub mod params;
pub mod properties;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::{ApiConfig, AppState, AppStateInner};
