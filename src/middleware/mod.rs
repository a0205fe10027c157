pub mod auth;
pub mod response;

pub use auth::{client_ip, jwt_auth_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult};
