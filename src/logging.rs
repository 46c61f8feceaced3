//! Logging setup.
//!
//! The crate logs through the `log` facade: `debug!` for tile and context
//! lifecycle, `warn!` for messages that could not be delivered, `error!` for
//! collaborator failures. Hosts bring their own logger; with the `debug`
//! feature enabled these helpers install `env_logger`.

/// Install `env_logger`, honouring `RUST_LOG`. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}

/// Install `env_logger` with an explicit filter such as `"tilewire=debug"`.
#[cfg(feature = "debug")]
pub fn init_with_filter(filter: &str) {
    let _ = env_logger::Builder::new().parse_filters(filter).try_init();
}

/// Without the `debug` feature logging is left to the host.
#[cfg(not(feature = "debug"))]
pub fn init() {}

#[cfg(not(feature = "debug"))]
pub fn init_with_filter(_filter: &str) {}
