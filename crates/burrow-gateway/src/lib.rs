//! HTTP front end of the Burrow URL shortener.
//!
//! The gateway turns requests into calls on a [`burrow_storage::Store`] and
//! maps the store's outcomes onto status codes. It owns no state of its own
//! besides the id generator and the public base URL.

pub mod app;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod identity;
pub mod model;
pub mod state;

pub use app::App;
pub use state::AppState;
