pub mod context;
pub mod filter;
pub mod query;
pub mod schema;
