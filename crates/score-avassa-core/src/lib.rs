pub mod convert;
pub mod error;
pub mod io;
pub mod names;
pub mod overrides;
pub mod paths;
pub mod provision;
pub mod render;
pub mod resource;
pub mod schema;
pub mod state;
pub mod substitute;
pub mod workload;

pub use error::{AvassaError, Result};
