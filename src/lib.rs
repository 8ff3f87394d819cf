//! Firebase Admin over REST.
//!
//! Start from [`FirebaseApp::initialize`] and derive service handles from it:
//! [`FirebaseApp::auth`], [`FirebaseApp::database`] and [`FirebaseApp::messaging`].

pub mod app;
#[cfg(feature = "auth")]
pub mod auth;
pub mod core;
#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "messaging")]
pub mod messaging;

#[cfg(test)]
pub(crate) mod test_support;

pub use app::{AppError, AppOptions, FirebaseApp};
pub use yup_oauth2;
