//! Unix signal handling: stop flag, print forwarding, masks

use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, Ordering};
use std::sync::Arc;

use nix::sys::signal::{
    self, pthread_sigmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};

use farm_core::protocol::Opcode;
use farm_core::{FarmError, FarmResult};

/// Print opcode as it goes on the wire, prebuilt for the handler
const PRINT_FRAME: [u8; 8] = Opcode::Print.to_i64().to_ne_bytes();

/// Signals that begin a graceful stop of the master
pub const STOP_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGHUP,
];

/// Signal that asks the collector for a snapshot print
pub const PRINT_SIGNAL: Signal = Signal::SIGUSR1;

/// Signals the collector keeps blocked for its whole life
pub const COLLECTOR_BLOCKED: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

mod errno {
    use libc::c_int;

    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "emscripten"))] {
            unsafe fn location() -> *mut c_int { libc::__errno_location() }
        } else if #[cfg(any(target_os = "android", target_os = "netbsd", target_os = "openbsd"))] {
            unsafe fn location() -> *mut c_int { libc::__errno() }
        } else if #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))] {
            unsafe fn location() -> *mut c_int { libc::__error() }
        } else {
            compile_error!("Unsupported platform");
        }
    }

    pub fn get() -> c_int {
        unsafe { *location() }
    }

    pub fn set(value: c_int) {
        unsafe { *location() = value }
    }
}

/// State shared between the master's threads and its signal handlers.
///
/// The handlers only flip `stop` or perform one write on `control_fd`.
#[derive(Debug)]
pub struct ShutdownContext {
    stop: AtomicBool,
    /// Control connection to the collector, -1 when closed
    control_fd: AtomicI32,
}

impl ShutdownContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: AtomicBool::new(false),
            control_fd: AtomicI32::new(-1),
        })
    }

    /// Set once a stop-class signal arrives; never cleared
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Same effect as a stop-class signal
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Register the control connection the print signal writes to.
    ///
    /// The descriptor must be non-blocking and stay open until
    /// [`clear_control_fd`](Self::clear_control_fd) returns.
    pub fn set_control_fd(&self, fd: RawFd) {
        self.control_fd.store(fd, Ordering::SeqCst);
    }

    pub fn clear_control_fd(&self) {
        self.control_fd.store(-1, Ordering::SeqCst);
    }

    /// Send the print opcode on the control connection.
    ///
    /// Async-signal-safe: one `write(2)` of a static buffer, errno preserved.
    /// A full socket buffer drops the request.
    pub fn notify_print(&self) {
        let fd = self.control_fd.load(Ordering::SeqCst);
        if fd < 0 {
            return;
        }
        let saved = errno::get();
        unsafe {
            libc::write(fd, PRINT_FRAME.as_ptr().cast(), PRINT_FRAME.len());
        }
        errno::set(saved);
    }
}

/// Context the handlers act on. Handlers take no arguments, so this single
/// registration slot is the only way to reach it.
static HANDLER_CONTEXT: AtomicPtr<ShutdownContext> = AtomicPtr::new(ptr::null_mut());

fn handler_context() -> Option<&'static ShutdownContext> {
    let raw = HANDLER_CONTEXT.load(Ordering::SeqCst);
    // SAFETY: a registered context is never released, see install_master_handlers
    unsafe { raw.as_ref() }
}

extern "C" fn on_stop(_sig: libc::c_int) {
    if let Some(ctx) = handler_context() {
        ctx.request_stop();
    }
}

extern "C" fn on_print(_sig: libc::c_int) {
    if let Some(ctx) = handler_context() {
        ctx.notify_print();
    }
}

fn signal_set(signals: &[Signal]) -> SigSet {
    let mut set = SigSet::empty();
    for sig in signals {
        set.add(*sig);
    }
    set
}

fn install(sig: Signal, handler: SigHandler) -> FarmResult<()> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: both handlers only touch atomics and call write(2)
    unsafe { signal::sigaction(sig, &action) }
        .map(drop)
        .map_err(|e| FarmError::Signal(format!("sigaction({:?}): {}", sig, e)))
}

/// Route the master's stop and print signals to `ctx` and ignore SIGPIPE.
///
/// The registered context is kept alive for the rest of the process; a
/// later call replaces it without releasing the earlier one.
pub fn install_master_handlers(ctx: &Arc<ShutdownContext>) -> FarmResult<()> {
    let raw = Arc::into_raw(Arc::clone(ctx)) as *mut ShutdownContext;
    HANDLER_CONTEXT.store(raw, Ordering::SeqCst);
    for sig in STOP_SIGNALS {
        install(sig, SigHandler::Handler(on_stop))?;
    }
    install(PRINT_SIGNAL, SigHandler::Handler(on_print))?;
    ignore_sigpipe()
}

/// Writes to a closed peer must fail with EPIPE instead of killing us
pub fn ignore_sigpipe() -> FarmResult<()> {
    unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) }
        .map(drop)
        .map_err(|e| FarmError::Signal(format!("ignoring SIGPIPE: {}", e)))
}

/// Block stop and print signals on the calling thread, returning the
/// previous mask for [`restore_mask`].
pub fn block_master_signals() -> FarmResult<SigSet> {
    let mut blocked = signal_set(&STOP_SIGNALS);
    blocked.add(PRINT_SIGNAL);
    let mut old = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut old))
        .map_err(|e| FarmError::Signal(format!("blocking signals: {}", e)))?;
    Ok(old)
}

pub fn restore_mask(old: &SigSet) -> FarmResult<()> {
    pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(old), None)
        .map_err(|e| FarmError::Signal(format!("restoring signal mask: {}", e)))
}

/// The collector is only ever stopped through the protocol
pub fn block_collector_signals() -> FarmResult<()> {
    pthread_sigmask(
        SigmaskHow::SIG_BLOCK,
        Some(&signal_set(&COLLECTOR_BLOCKED)),
        None,
    )
    .map_err(|e| FarmError::Signal(format!("blocking signals: {}", e)))
}
