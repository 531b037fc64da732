pub mod api;
pub mod id;
pub mod metrics;
pub mod models;

pub use id::{InvalidIdentifier, ObjectId};
