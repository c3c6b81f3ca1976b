pub mod handlers;
pub mod routes;
pub mod schema;

pub use routes::build_router;
pub use schema::AppState;
