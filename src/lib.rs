mod cfg;
pub use cfg::*;
mod telemetry;
pub use telemetry::*;
mod errors;
pub use errors::*;

pub mod api;
pub mod chat;
pub mod cognito;
pub mod dialogues;
pub mod pages;
pub mod reveal;
pub mod session;
pub mod shell;
pub mod types;

pub use api::Api;
pub use cognito::Cognito;
pub use session::Session;
pub use shell::Shell;
