pub mod admin_flags;
pub mod admin_metrics;
pub mod admin_segments;
pub mod admin_traits;
pub mod admin_users;
pub mod admin_validate;
pub mod decide;
pub mod export;
pub mod health;
pub mod identify;
pub mod track;
