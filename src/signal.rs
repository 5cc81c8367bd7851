//! SIGINT/SIGTERM handling
//!
//! The first signal sets the run's cancel flag so the engine stops between
//! resources. A second one exits immediately with status 130.

use converge::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_signal(_signal: libc::c_int) {
    if let Some(flag) = FLAG.get()
        && flag.swap(true, Ordering::SeqCst)
    {
        #[allow(unsafe_code)]
        // SAFETY: _exit is async-signal-safe
        unsafe {
            libc::_exit(130);
        }
    }
}

/// Install the handlers and return the token they cancel
pub fn install() -> CancelToken {
    let flag = FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)));
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;

    for signal in [libc::SIGINT, libc::SIGTERM] {
        #[allow(unsafe_code)]
        // SAFETY: the handler only touches an atomic and calls _exit
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == libc::SIG_ERR {
            log::warn!("Could not install handler for signal {signal}");
        }
    }

    CancelToken::from_flag(Arc::clone(flag))
}

