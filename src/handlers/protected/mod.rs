// handlers/protected/mod.rs - endpoints behind jwt_auth_middleware
//
// Every handler here can rely on an `AuthUser` request extension.
pub mod protocols;
pub mod registry;
pub mod users;

pub use protocols::{
    protocol_create, protocol_delete, protocol_export, protocol_get, protocol_list, protocol_replace_document,
};
pub use registry::{counters_get, dashboard_get};
pub use users::{change_password_post, user_delete, user_set_active, users_list};
