//! Logging macros.
//!
//! Firmware builds (`firmware` feature) log through `defmt` over RTT. Host unit tests print to
//! stdout so failing tests show the supervisor's trail. Every other host build type-checks the
//! arguments and discards them.
//!
//! Only `{}` placeholders are used so the same call sites satisfy both `defmt::Format` and
//! `core::fmt::Display`.

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        ::std::println!("[INFO] {}", ::std::format!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        ::std::println!("[WARN] {}", ::std::format!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        ::std::println!("[ERROR] {}", ::std::format!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        ::std::println!("[DEBUG] {}", ::std::format!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}
