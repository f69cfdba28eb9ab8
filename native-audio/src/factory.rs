//! Build-target engine selection.

use native_audio_core::models::config::EngineConfig;
use native_audio_core::models::error::CaptureError;
use native_audio_core::traits::audio_engine::AudioEngine;

/// The engine for this build target: WASAPI on Windows, CoreAudio on macOS.
///
/// Other targets get [`CaptureError::UnsupportedPlatform`] once `config` has
/// been validated.
pub fn create_platform_engine(config: EngineConfig) -> Result<Box<dyn AudioEngine>, CaptureError> {
    let engine = platform_engine(config)?;
    log::debug!("created {} engine", platform_name());
    Ok(engine)
}

/// Backend name for the build target.
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "wasapi"
    } else if cfg!(target_os = "macos") {
        "coreaudio"
    } else {
        "unsupported"
    }
}

#[cfg(target_os = "windows")]
fn platform_engine(config: EngineConfig) -> Result<Box<dyn AudioEngine>, CaptureError> {
    Ok(Box::new(native_audio_windows::create_engine(config)?))
}

#[cfg(target_os = "macos")]
fn platform_engine(config: EngineConfig) -> Result<Box<dyn AudioEngine>, CaptureError> {
    Ok(Box::new(native_audio_macos::create_engine(config)?))
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_engine(config: EngineConfig) -> Result<Box<dyn AudioEngine>, CaptureError> {
    config.validate()?;
    Err(CaptureError::UnsupportedPlatform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_everywhere() {
        let config = EngineConfig {
            delivery_queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            create_platform_engine(config),
            Err(CaptureError::InvalidConfig(_))
        ));
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn other_targets_are_unsupported() {
        assert!(matches!(
            create_platform_engine(EngineConfig::default()),
            Err(CaptureError::UnsupportedPlatform)
        ));
        assert_eq!(platform_name(), "unsupported");
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    #[test]
    fn supported_targets_start_idle() {
        let engine = create_platform_engine(EngineConfig::default()).unwrap();
        assert!(engine.state().is_idle());
    }
}
