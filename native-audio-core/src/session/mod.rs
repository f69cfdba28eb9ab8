pub mod capture_session;
pub mod platform_engine;
