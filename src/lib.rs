pub mod api;
pub mod artifact;
pub mod callback;
pub mod config;
pub mod error;
pub mod poll;
pub mod run;
pub mod shutdown;
