// Structured logging backend wired to the `log` facade crate.
//
// Named `klog` (not `log`) because `crate::log` already names the
// filesystem's write-ahead journal -- unrelated to this module.

use crate::printf;
use crate::spinlock::Spinlock;
use ::log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

struct KernelLogger {
    lock: Spinlock,
}

static mut LOGGER: KernelLogger = KernelLogger {
    lock: Spinlock::init_lock("klog"),
};

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= ::log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        unsafe {
            // Printer already serializes concurrent printf()s; this lock
            // only protects the two writes (prefix, then message) from
            // interleaving with each other across CPUs.
            let logger = &mut *core::ptr::addr_of_mut!(LOGGER);
            logger.lock.acquire();
            printf!("[{:<5} {}] {}\n", record.level(), record.target(), record.args());
            logger.lock.release();
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger as the global `log` facade backend.
///
/// Must be called once, after the console/UART is ready, before any
/// `log::*!` macro is used. Safe to call only from CPU 0 during boot.
pub fn init(max_level: LevelFilter) -> Result<(), SetLoggerError> {
    unsafe {
        ::log::set_logger(&*core::ptr::addr_of!(LOGGER))?;
    }
    ::log::set_max_level(max_level);
    Ok(())
}
