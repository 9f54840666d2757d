pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Milliseconds since the epoch, as a string. Used to seed offline ids.
pub(crate) fn now_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
