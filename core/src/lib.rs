pub mod buffer;
pub mod bus;
pub mod client;
pub mod config;
pub mod document;
pub mod ids;
pub mod operation;
pub mod roles;
pub mod store;
pub mod user;

pub use ids::{DocId, UserId};
pub use operation::Operation;
