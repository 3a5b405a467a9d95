//! # FTPS drop directory
//!
//! [`FtpsDropDirectory`] implements the core [`RemoteSource`] trait against the provider's
//! FTP server using explicit TLS with a protected data channel.
//!
//! - Every call opens its own session (connect, TLS upgrade, login, change directory) and
//!   closes it with `QUIT` on every exit path.
//! - `suppaftp` is blocking, so each session runs on the blocking thread pool.
//! - Credentials come from [`crate::load_config::DropCredentials`]; the password is never
//!   logged.

use async_trait::async_trait;
use settlement_sync_core::contract::RemoteSource;
use settlement_sync_core::error::TransportError;
use suppaftp::native_tls::TlsConnector;
use suppaftp::{FtpError, NativeTlsConnector, NativeTlsFtpStream, Status};
use tracing::{debug, info, warn};

use crate::load_config::{DropCredentials, RemoteSection};

#[derive(Debug, Clone)]
pub struct FtpsDropDirectory {
    host: String,
    port: u16,
    directory: String,
    credentials: DropCredentials,
}

impl FtpsDropDirectory {
    pub fn new(remote: &RemoteSection, credentials: &DropCredentials) -> Self {
        Self {
            host: remote.host.clone(),
            port: remote.port,
            directory: remote.directory.clone(),
            credentials: credentials.clone(),
        }
    }

    fn open(&self) -> Result<NativeTlsFtpStream, TransportError> {
        let connect_err = |e: &dyn std::fmt::Display| TransportError::Connect {
            host: self.host.clone(),
            reason: e.to_string(),
        };

        let plain = NativeTlsFtpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| connect_err(&e))?;
        let tls = TlsConnector::new().map_err(|e| connect_err(&e))?;
        let mut stream = plain
            .into_secure(NativeTlsConnector::from(tls), &self.host)
            .map_err(|e| connect_err(&e))?;

        if let Err(e) = stream.login(&self.credentials.user, &self.credentials.password) {
            close(stream);
            return Err(TransportError::Auth {
                user: self.credentials.user.clone(),
                reason: e.to_string(),
            });
        }
        if let Err(e) = stream.cwd(&self.directory) {
            close(stream);
            return Err(TransportError::Transfer(format!(
                "cannot enter remote directory {}: {e}",
                self.directory
            )));
        }
        debug!(host = %self.host, directory = %self.directory, "[SYNC][FETCH] FTPS session open");
        Ok(stream)
    }

    /// Runs `op` inside a fresh session on the blocking pool and closes the session.
    async fn with_session<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut NativeTlsFtpStream) -> Result<T, TransportError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut stream = this.open()?;
            let result = op(&mut stream);
            close(stream);
            result
        })
        .await
        .map_err(|e| TransportError::Transfer(format!("FTPS worker failed: {e}")))?
    }
}

fn close(mut stream: NativeTlsFtpStream) {
    if let Err(e) = stream.quit() {
        warn!(error = %e, "[SYNC][FETCH] FTPS session did not close cleanly");
    }
}

fn is_file_unavailable(e: &FtpError) -> bool {
    matches!(e, FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable)
}

/// `NLST` may answer with paths; keep the last component.
fn base_name(entry: &str) -> &str {
    entry.rsplit('/').next().unwrap_or(entry)
}

#[async_trait]
impl RemoteSource for FtpsDropDirectory {
    async fn list(&self) -> Result<Vec<String>, TransportError> {
        let names = self
            .with_session(|stream| match stream.nlst(None) {
                Ok(entries) => Ok(entries
                    .iter()
                    .map(|entry| base_name(entry.trim()).to_string())
                    .filter(|name| !name.is_empty())
                    .collect()),
                // Some servers answer 550 to NLST on an empty directory.
                Err(e) if is_file_unavailable(&e) => Ok(Vec::new()),
                Err(e) => Err(TransportError::Transfer(format!("listing failed: {e}"))),
            })
            .await?;
        info!(host = %self.host, count = names.len(), "[SYNC][FETCH] Remote directory listed");
        Ok(names)
    }

    async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, TransportError> {
        let name = file_name.to_string();
        let bytes = self
            .with_session(move |stream| match stream.retr_as_buffer(&name) {
                Ok(cursor) => Ok(cursor.into_inner()),
                Err(e) if is_file_unavailable(&e) => Err(TransportError::NotFound(name)),
                Err(e) => Err(TransportError::Transfer(format!("download of {name} failed: {e}"))),
            })
            .await?;
        debug!(file = %file_name, size = bytes.len(), "[SYNC][FETCH] Remote file downloaded");
        Ok(bytes)
    }
}
