pub mod commit;
pub mod config;
pub mod error;
pub mod export;
pub mod http_client;
pub mod join;
pub mod portal;
pub mod retry;
pub mod schema;
pub mod sheets_store;
pub mod sqlite_store;
pub mod state;
pub mod store;
pub mod table;

pub use error::{PortalError, Result};
