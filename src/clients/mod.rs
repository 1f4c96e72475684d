pub mod database;
pub mod health;
pub mod memory;
pub mod providers;
pub mod registry;
pub mod store;
pub mod template;
