//! HTTP routes for depot

pub mod health;
pub mod storage;

pub use health::{health_check, readiness_check, version_info};
pub use storage::{
    handle_create, handle_delete, handle_get, handle_update, handle_wipe,
};
