pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod shutdown;
pub mod state;
pub mod validation;
