//! Opening URLs in the user's browser

use std::process::{Command, Stdio};

use thiserror::Error;

/// Errors raised while launching the browser
#[derive(Error, Debug)]
pub enum BrowserError {
    /// No known opener exists for this platform
    #[error("Opening a browser is not supported on {0}")]
    UnsupportedPlatform(&'static str),

    /// The opener could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Opener program.
        program: &'static str,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Program and leading arguments of the platform's URL opener
fn opener() -> Result<(&'static str, &'static [&'static str]), BrowserError> {
    match std::env::consts::OS {
        "linux" | "freebsd" | "openbsd" | "netbsd" => Ok(("xdg-open", &[])),
        "macos" => Ok(("open", &[])),
        "windows" => Ok(("rundll32", &["url.dll,FileProtocolHandler"])),
        other => Err(BrowserError::UnsupportedPlatform(other)),
    }
}

/// Starts the platform opener for `url` without waiting for it
///
/// # Errors
///
/// Returns [`BrowserError`] if the platform has no opener or it cannot be
/// started.
pub fn open_in_browser(url: &str) -> Result<(), BrowserError> {
    let (program, args) = opener()?;
    let mut child = Command::new(program)
        .args(args)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| BrowserError::Spawn { program, source })?;

    tracing::debug!(program, url = %url, "Opened browser");
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_uses_xdg_open() {
        let (program, args) = opener().unwrap();
        assert_eq!(program, "xdg-open");
        assert!(args.is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = BrowserError::UnsupportedPlatform("plan9");
        assert_eq!(err.to_string(), "Opening a browser is not supported on plan9");
    }
}
