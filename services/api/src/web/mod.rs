pub mod auth;
pub mod courses;
pub mod discussions;
pub mod enrollments;
pub mod invites;
pub mod middleware;
pub mod payments;
pub mod progress;
pub mod rest;
pub mod state;

// Re-export the pieces the binaries wire together: the OpenAPI master
// definition and the auth gate for protected routes.
pub use middleware::require_auth;
pub use rest::ApiDoc;
