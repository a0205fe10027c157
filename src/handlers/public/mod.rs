// handlers/public/mod.rs - endpoints reachable without a token
pub mod auth;
pub mod system;

pub use auth::login_post;
pub use system::{health, root};
