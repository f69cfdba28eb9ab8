//! Per-thread COM apartment guard.

use std::marker::PhantomData;

use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use native_audio_core::models::error::CaptureError;

/// Joins the multithreaded apartment for the lifetime of the guard.
///
/// `S_FALSE` (already initialized) is balanced with `CoUninitialize` like
/// `S_OK`. `RPC_E_CHANGED_MODE` means the thread already lives in another
/// apartment, which is usable but not ours to tear down.
pub struct ComGuard {
    uninitialize: bool,
    // COM initialization is per thread.
    _not_send: PhantomData<*const ()>,
}

impl ComGuard {
    pub fn init() -> Result<Self, CaptureError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr.is_ok() {
            return Ok(Self {
                uninitialize: true,
                _not_send: PhantomData,
            });
        }
        if hr == RPC_E_CHANGED_MODE {
            log::debug!("COM already initialized with a different threading model");
            return Ok(Self {
                uninitialize: false,
                _not_send: PhantomData,
            });
        }
        Err(CaptureError::ConfigurationFailed(format!(
            "CoInitializeEx failed: HRESULT 0x{:08X}",
            hr.0 as u32
        )))
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.uninitialize {
            unsafe { CoUninitialize() };
        }
    }
}
