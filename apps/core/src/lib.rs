pub mod config;
pub mod history_service;
pub mod history_store;
pub mod listeners;
pub mod logging;
pub mod model;
pub mod runtime;
pub mod search_view;
pub mod suggestion_coordinator;
pub mod view_state;
pub mod voice;
