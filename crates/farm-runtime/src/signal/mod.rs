//! Signal handling for cooperative shutdown
//!
//! Stop-class signals set the stop flag of the installed
//! [`ShutdownContext`], which the producer polls. The print signal forwards
//! a single print opcode on the context's control connection.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("Unsupported platform");
    }
}
