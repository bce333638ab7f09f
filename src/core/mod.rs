pub mod backend;
pub mod error;
pub mod http;
pub mod mock;
pub mod models;
pub mod state;
pub mod validation;
