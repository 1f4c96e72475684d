pub mod delivery;
pub mod event;
pub mod health;
pub mod provider;
pub mod response;
pub mod retry;
pub mod settings;
pub mod status;
pub mod template;
pub mod validation;
