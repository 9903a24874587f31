//! `jcli auth` and `jcli connect`

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

use jcli::infrastructure::{CredentialStore, FileCredentialStore};
use jcli::jenkins::{ApiError, JenkinsClient};

use super::Target;

const CONFIRM_TRIES: usize = 3;

/// Asks a yes/no question, retrying on empty answers
///
/// Anything starting with `y` or `Y` is a yes. End of input counts as no.
///
/// # Errors
///
/// Returns an I/O error if the prompt cannot be written or read.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool> {
    for _ in 0..CONFIRM_TRIES {
        write!(output, "{question} [y/n]: ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        let answer = answer.trim();
        if answer.is_empty() {
            continue;
        }
        return Ok(answer.to_lowercase().starts_with('y'));
    }
    Ok(false)
}

/// Verifies that `client` reaches the server and is allowed in
///
/// # Errors
///
/// Returns a descriptive error when the server is unreachable or rejects
/// the credentials.
pub async fn verify_access(client: &JenkinsClient) -> Result<()> {
    let address = client.session().address().to_string();
    match client.check_access().await {
        Ok(status) => {
            tracing::info!(address = %address, status = status.as_u16(), "Access granted");
            Ok(())
        }
        Err(ApiError::Auth { status }) => {
            bail!("Access denied by {address} (HTTP {status}); check the user and token")
        }
        Err(e @ ApiError::Connection { .. }) => {
            Err(e).with_context(|| format!("Could not reach Jenkins at {address}"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Stores `token` unless a key exists and the user declines to replace it
///
/// Returns whether the token was saved.
///
/// # Errors
///
/// Returns an error if the store or the prompt fails.
pub fn store_token<S, R, W>(
    store: &S,
    target: &Target,
    token: &str,
    overwrite: bool,
    input: &mut R,
    output: &mut W,
) -> Result<bool>
where
    S: CredentialStore,
    R: BufRead,
    W: Write,
{
    if !overwrite && store.load(&target.address, &target.user)?.is_some() {
        let question = format!(
            "A token for {} on {} is already stored. Replace it?",
            target.user, target.address
        );
        if !confirm(input, output, &question)? {
            return Ok(false);
        }
    }
    store.save(&target.address, &target.user, token)?;
    Ok(true)
}

/// Checks the token against the server and stores it
///
/// # Errors
///
/// Returns an error if the server rejects the token or it cannot be stored.
pub async fn authenticate(target: &Target, token: &str, overwrite: bool) -> Result<()> {
    let client = target.client_with_key(token)?;
    verify_access(&client).await?;

    let store = FileCredentialStore::default_location()?;
    let saved = store_token(
        &store,
        target,
        token,
        overwrite,
        &mut std::io::stdin().lock(),
        &mut std::io::stderr(),
    )?;
    if saved {
        println!(
            "Token for {} on {} saved to {}",
            target.user,
            target.address,
            store.path().display()
        );
    } else {
        println!("Kept the existing token");
    }
    Ok(())
}

/// Checks the stored token against the server
///
/// # Errors
///
/// Returns an error if no token is stored or the server rejects it.
pub async fn connect(target: &Target) -> Result<()> {
    let client = target.client()?;
    verify_access(&client).await?;
    println!("Connected to {} as {}", target.address, target.user);
    Ok(())
}
