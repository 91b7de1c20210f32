pub mod cache_flag;
pub mod capability;
pub mod context;
pub mod role_assignment;
pub mod role_capability;
