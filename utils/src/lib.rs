pub mod device_info;
pub mod logger;
pub mod text;
