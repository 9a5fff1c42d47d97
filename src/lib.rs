pub mod child_process;
pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod routing;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use session_management::SessionStatus;
