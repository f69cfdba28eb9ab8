//! TCC (Transparency, Consent, and Control) permission gate.
//!
//! Microphone and system audio recording are separate TCC services. Both are
//! queried and requested through the private TCC framework, loaded once with
//! `dlopen`.
//!
//! When the framework cannot be loaded there is no status to read, and the
//! gate reports granted for both services. Consent is then still enforced by
//! CoreAudio itself: an unauthorized microphone or tap opens but delivers
//! silence. Reporting denied instead would make every start fail with
//! `PermissionDenied` on such systems, even for users who granted access.

use std::ffi::{c_char, c_void};
use std::sync::OnceLock;
use std::time::Duration;

use objc2::rc::Retained;
use objc2::runtime::Bool;
use objc2_foundation::NSString;

use native_audio_core::models::device::{PermissionKind, PermissionStatus};

extern "C" {
    fn dlopen(filename: *const c_char, flags: i32) -> *mut c_void;
    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
}
const RTLD_LAZY: i32 = 0x1;

/// Upper bound on a blocking consent request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TccStatus {
    Authorized,
    Denied,
    Undetermined,
}

impl TccStatus {
    fn from_preflight(code: i32) -> Self {
        match code {
            0 => Self::Authorized,
            1 => Self::Denied,
            _ => Self::Undetermined,
        }
    }
}

// The service parameter is a CFStringRef (toll-free bridged to NSString*).
type TccAccessPreflightFn = unsafe extern "C" fn(*const c_void, *const c_void) -> i32;
type TccAccessRequestFn = unsafe extern "C" fn(*const c_void, *const c_void, *const block2::Block<dyn Fn(Bool)>);

struct TccFns {
    preflight: TccAccessPreflightFn,
    request: TccAccessRequestFn,
}

// SAFETY: plain function pointers into a framework that is never unloaded.
unsafe impl Send for TccFns {}
unsafe impl Sync for TccFns {}

static TCC_FNS: OnceLock<Option<TccFns>> = OnceLock::new();

fn load() -> Option<&'static TccFns> {
    TCC_FNS
        .get_or_init(|| {
            let path = c"/System/Library/PrivateFrameworks/TCC.framework/TCC";
            let handle = unsafe { dlopen(path.as_ptr(), RTLD_LAZY) };
            if handle.is_null() {
                log::warn!("TCC: could not dlopen TCC.framework");
                return None;
            }

            let preflight = unsafe { dlsym(handle, c"TCCAccessPreflight".as_ptr()) };
            let request = unsafe { dlsym(handle, c"TCCAccessRequest".as_ptr()) };
            if preflight.is_null() || request.is_null() {
                log::warn!("TCC: could not resolve TCCAccessPreflight/TCCAccessRequest");
                return None;
            }

            Some(TccFns {
                preflight: unsafe { std::mem::transmute::<*mut c_void, TccAccessPreflightFn>(preflight) },
                request: unsafe { std::mem::transmute::<*mut c_void, TccAccessRequestFn>(request) },
            })
        })
        .as_ref()
}

pub fn service_name(kind: PermissionKind) -> &'static str {
    match kind {
        PermissionKind::Mic => "kTCCServiceMicrophone",
        PermissionKind::System => "kTCCServiceAudioCapture",
    }
}

fn service_string(kind: PermissionKind) -> Retained<NSString> {
    NSString::from_str(service_name(kind))
}

/// Current status without prompting; `None` when TCC is unavailable.
pub fn preflight(kind: PermissionKind) -> Option<TccStatus> {
    let fns = load()?;
    let service = service_string(kind);
    let service_ptr: *const c_void = (&*service as *const NSString).cast();
    let code = unsafe { (fns.preflight)(service_ptr, std::ptr::null()) };
    Some(TccStatus::from_preflight(code))
}

/// Show the consent dialog if undetermined. Blocks until the user answers
/// or [`REQUEST_TIMEOUT`] expires; `None` when TCC is unavailable.
pub fn request(kind: PermissionKind) -> Option<bool> {
    let fns = load()?;
    let service = service_string(kind);
    let service_ptr: *const c_void = (&*service as *const NSString).cast();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let block = block2::RcBlock::new(move |granted: Bool| {
        let _ = tx.try_send(granted.as_bool());
    });
    unsafe {
        (fns.request)(service_ptr, std::ptr::null(), &*block);
    }
    match rx.recv_timeout(REQUEST_TIMEOUT) {
        Ok(granted) => Some(granted),
        Err(_) => {
            log::warn!("TCC: {} request timed out after {:?}", service_name(kind), REQUEST_TIMEOUT);
            Some(false)
        }
    }
}

/// Non-prompting read of one service. Unavailable TCC counts as granted.
pub fn is_permitted(kind: PermissionKind) -> bool {
    match preflight(kind) {
        Some(status) => {
            log::debug!("TCC: {} is {:?}", service_name(kind), status);
            status == TccStatus::Authorized
        }
        None => true,
    }
}

pub fn check_permission() -> PermissionStatus {
    PermissionStatus {
        mic: is_permitted(PermissionKind::Mic),
        system: is_permitted(PermissionKind::System),
    }
}

pub fn request_permission(kind: PermissionKind) -> bool {
    if preflight(kind) == Some(TccStatus::Authorized) {
        return true;
    }
    log::info!("TCC: requesting {} permission", kind);
    request(kind).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_codes() {
        assert_eq!(TccStatus::from_preflight(0), TccStatus::Authorized);
        assert_eq!(TccStatus::from_preflight(1), TccStatus::Denied);
        assert_eq!(TccStatus::from_preflight(2), TccStatus::Undetermined);
    }

    #[test]
    fn services_are_distinct() {
        assert_eq!(service_name(PermissionKind::Mic), "kTCCServiceMicrophone");
        assert_eq!(service_name(PermissionKind::System), "kTCCServiceAudioCapture");
    }

    #[test]
    fn check_does_not_prompt() {
        let _ = check_permission();
    }

    #[test]
    fn unreadable_service_counts_as_granted() {
        for kind in [PermissionKind::Mic, PermissionKind::System] {
            if preflight(kind).is_none() {
                assert!(is_permitted(kind));
            }
        }
    }
}
