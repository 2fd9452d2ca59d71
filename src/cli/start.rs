use crate::cli::{
    actions::Action,
    commands::{self, logging},
    dispatch::handler,
    telemetry,
};
use anyhow::Result;

/// Parse the command line, set up logging and return the action to run.
/// # Errors
/// Returns an error if logging cannot be initialized or the arguments are
/// inconsistent.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);

    telemetry::init(logging::tracing_level(verbosity))?;

    handler(&matches)
}
