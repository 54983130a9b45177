//! Debug logging for method generation and emission.
//!
//! Compiles to nothing unless the `debug-codegen` feature is enabled.

/// Debug logging macro that compiles to nothing when the `debug-codegen`
/// feature is disabled.
///
/// # Examples
///
/// ```ignore
/// debug_codegen!("allocate_constants: {} constants queued", queue.len());
/// ```
#[cfg(feature = "debug-codegen")]
#[macro_export]
macro_rules! debug_codegen {
    ($($arg:tt)*) => {
        {
            #[cfg(test)]
            {
                extern crate std;
                std::eprintln!("[codegen] {}", core::format_args!($($arg)*));
            }
            #[cfg(not(test))]
            {
                let _ = core::format_args!($($arg)*);
            }
        }
    };
}

/// Debug logging macro that compiles to nothing when the `debug-codegen`
/// feature is disabled.
#[cfg(not(feature = "debug-codegen"))]
#[macro_export]
macro_rules! debug_codegen {
    ($($arg:tt)*) => {};
}
