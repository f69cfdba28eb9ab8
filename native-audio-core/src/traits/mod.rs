pub mod audio_engine;
pub mod audio_platform;
pub mod capture_backend;
