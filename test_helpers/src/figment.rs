//! Running configuration tests inside a [`figment::Jail`].
//!
//! The jail gives each test a private working directory and environment, so
//! `stratum.toml` files and `STRATUM_` variables never leak between tests.

use anyhow::{Result, anyhow};

/// File name the command-line tool looks for in the working directory.
pub const CONFIG_FILE: &str = "stratum.toml";

/// Execute `f` inside a jail and return its output.
///
/// # Errors
///
/// Returns an error when the jail cannot be created or the closure fails.
pub fn with_jail<F, T>(f: F) -> Result<T>
where
    F: FnOnce(&mut figment::Jail) -> figment::error::Result<T>,
{
    let mut output = None;
    figment::Jail::try_with(|jail| {
        output = Some(f(jail)?);
        Ok(())
    })
    .map_err(|err| anyhow!(err.to_string()))?;
    output.ok_or_else(|| anyhow!("jail closure returned no value"))
}

/// Write `contents` to `stratum.toml` in the jail's directory.
///
/// # Errors
///
/// Returns the jail's error when the file cannot be written.
pub fn write_config(jail: &mut figment::Jail, contents: &str) -> figment::error::Result<()> {
    jail.create_file(CONFIG_FILE, contents)?;
    Ok(())
}

/// Convert any displayable error into a [`figment::Error`].
#[expect(
    clippy::needless_pass_by_value,
    reason = "callers map owned errors straight into the jail's error type"
)]
pub fn figment_error<E: ToString>(err: E) -> figment::Error {
    figment::Error::from(err.to_string())
}
