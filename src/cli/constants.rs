//! Process-global display level and the `display!`/`displaylevel!` macros
//! that gate progress/warning output, matching the teacher's house style of
//! avoiding a logging crate in favor of a simple atomic + macro pair.

use std::sync::atomic::{AtomicU32, Ordering};

/// 0 = quiet, 1 = normal (warnings), 2 = verbose (`-v`), 3 = very verbose (`-vv`).
pub static DISPLAY_LEVEL: AtomicU32 = AtomicU32::new(1);

pub fn set_display_level(level: u32) {
    DISPLAY_LEVEL.store(level, Ordering::Relaxed);
}

pub fn display_level() -> u32 {
    DISPLAY_LEVEL.load(Ordering::Relaxed)
}

/// `true` when the current display level is at least `$level`.
#[macro_export]
macro_rules! displaylevel {
    ($level:expr) => {
        $crate::cli::constants::display_level() >= $level
    };
}

/// Prints to stderr only if the current display level is at least `$level`.
#[macro_export]
macro_rules! display {
    ($level:expr, $($arg:tt)*) => {
        if $crate::displaylevel!($level) {
            eprintln!($($arg)*);
        }
    };
}
