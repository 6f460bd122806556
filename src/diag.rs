//! Tagged diagnostic output.
//!
//! Lines are printed as `[Tag] message` on `std` builds. With the `defmt`
//! feature enabled the message goes to the defmt logger instead. Without
//! either, the macros compile to nothing.
//!
//! Never call these from interrupt context.

macro_rules! diag_error {
    ($tag:expr, $($arg:tt)+) => {{
        let _ = $tag;
        #[cfg(feature = "defmt")]
        defmt::error!($($arg)+);
        #[cfg(all(feature = "std", not(feature = "defmt")))]
        std::eprintln!("{} {}", $tag, core::format_args!($($arg)+));
    }};
}

macro_rules! diag_warn {
    ($tag:expr, $($arg:tt)+) => {{
        let _ = $tag;
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)+);
        #[cfg(all(feature = "std", not(feature = "defmt")))]
        std::eprintln!("{} {}", $tag, core::format_args!($($arg)+));
    }};
}

macro_rules! diag_info {
    ($tag:expr, $($arg:tt)+) => {{
        let _ = $tag;
        #[cfg(feature = "defmt")]
        defmt::info!($($arg)+);
        #[cfg(all(feature = "std", not(feature = "defmt")))]
        std::println!("{} {}", $tag, core::format_args!($($arg)+));
    }};
}
