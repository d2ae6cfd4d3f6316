//! Non-fatal precondition checks
//!
//! A violated precondition is a programming error: it panics in debug builds
//! and turns the calling operation into a logged no-op in release builds.
//! Never used on the audio thread.

/// Evaluate a precondition and return whether it holds.
///
/// ```ignore
/// if !verify_or_debug_assert!(index < self.slots.len(), "slot {} out of range", index) {
///     return;
/// }
/// ```
macro_rules! verify_or_debug_assert {
    ($cond:expr, $($arg:tt)+) => {{
        let holds: bool = $cond;
        if !holds {
            log::error!(
                "Precondition `{}` failed: {}",
                stringify!($cond),
                format_args!($($arg)+)
            );
            debug_assert!(holds, $($arg)+);
        }
        holds
    }};
}
