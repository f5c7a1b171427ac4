//! Service support library: tracing bootstrap, engine wiring, request
//! handling and the framed TCP front end.

pub mod bootstrap;
mod logging;
pub mod search_handler;
pub mod server;
pub mod status;

pub use bootstrap::{ServiceState, build_state};
pub use logging::init_tracing_with_config;
pub use search_handler::{EngineSearchHandler, SearchHandler};
pub use server::{dispatch, serve};
