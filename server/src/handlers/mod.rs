pub mod auth_handlers;
pub mod doc_handlers;
pub mod health_handlers;
