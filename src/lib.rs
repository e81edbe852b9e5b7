pub mod alert_management;
pub mod authorization;
pub mod configuration;
pub mod error_handling;
pub mod network;
pub mod storage;
pub mod web_interface;
