//! IMAP session for the legacy variant.
//!
//! Connects over TLS, authenticates with an app password, and exposes the
//! four operations the export needs: select a folder, enumerate message
//! UIDs, fetch one message, log out. Fetching is strictly one message at a
//! time so a single undecodable or missing message never takes down the
//! run.

use async_imap::Session;
use async_native_tls::TlsConnector;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::{ExportError, Result};

type AsyncTcpStream = async_io::Async<std::net::TcpStream>;
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// An authenticated IMAP session. Callers must invoke [`logout`] on every
/// exit path; dropping a live session only emits a warning.
///
/// [`logout`]: MailboxSession::logout
pub struct MailboxSession {
    session: Option<Session<TlsStream>>,
}

impl MailboxSession {
    /// Connect to `host:port` over TLS and authenticate with LOGIN.
    ///
    /// Transport failures (TCP, TLS) and rejected credentials map to
    /// distinct error variants so the user can tell a typo'd password from
    /// an unreachable server.
    pub async fn connect(
        host: &str,
        port: u16,
        email: &str,
        password: &SecretString,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        info!("Connecting to {}", addr);

        let std_stream = std::net::TcpStream::connect(&addr)
            .map_err(|e| ExportError::Connect(format!("could not reach {}: {}", addr, e)))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| ExportError::Connect(e.to_string()))?;
        let tcp_stream = async_io::Async::new(std_stream)
            .map_err(|e| ExportError::Connect(e.to_string()))?;

        let tls_stream = TlsConnector::new()
            .connect(host, tcp_stream)
            .await
            .map_err(|e| ExportError::Connect(format!("TLS handshake failed: {}", e)))?;

        let client = async_imap::Client::new(tls_stream);
        let session = client.login(email, password.expose_secret()).await.map_err(
            |(e, _client)| {
                ExportError::Auth(format!(
                    "login rejected for {}: {}. Use an app password, not your regular password",
                    email, e
                ))
            },
        )?;

        info!("Authenticated as {}", email);
        Ok(Self {
            session: Some(session),
        })
    }

    fn session(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| ExportError::Connect("not connected".to_string()))
    }

    /// SELECT a folder; returns the server-reported message count.
    pub async fn select_folder(&mut self, folder: &str) -> Result<u32> {
        let session = self.session()?;
        let mailbox = session
            .select(folder)
            .await
            .map_err(|_| ExportError::FolderNotFound(folder.to_string()))?;

        debug!("Selected '{}' ({} messages)", folder, mailbox.exists);
        Ok(mailbox.exists)
    }

    /// List the names of every folder on the account. Used to help the
    /// user when the requested folder does not exist.
    pub async fn list_folders(&mut self) -> Result<Vec<String>> {
        let session = self.session()?;
        let mut stream = session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| ExportError::Fetch(format!("folder listing failed: {}", e)))?;

        let mut names = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(name) => names.push(name.name().to_string()),
                Err(e) => warn!("Skipping unreadable folder entry: {}", e),
            }
        }
        Ok(names)
    }

    /// UID SEARCH ALL in the selected folder, sorted ascending.
    ///
    /// The server returns an unordered set; sorting restores the
    /// ascending-UID order [`most_recent`] relies on.
    pub async fn search_all(&mut self) -> Result<Vec<u32>> {
        let session = self.session()?;
        let uids = session
            .uid_search("ALL")
            .await
            .map_err(|e| ExportError::Fetch(format!("search failed: {}", e)))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        debug!("Found {} messages", uid_list.len());
        Ok(uid_list)
    }

    /// Fetch one full message (RFC822) by UID.
    pub async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>> {
        let session = self.session()?;
        let mut stream = session
            .uid_fetch(uid.to_string(), "(RFC822)")
            .await
            .map_err(|e| ExportError::Fetch(format!("fetch of UID {} failed: {}", uid, e)))?;

        let fetch = stream
            .next()
            .await
            .ok_or_else(|| ExportError::Fetch(format!("UID {} not found", uid)))?
            .map_err(|e| ExportError::Fetch(format!("fetch of UID {} failed: {}", uid, e)))?;

        let body = fetch
            .body()
            .ok_or_else(|| ExportError::Fetch(format!("UID {} has no body", uid)))?;
        Ok(body.to_vec())
    }

    /// Log out and close the session. Safe to call more than once.
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting");
            session
                .logout()
                .await
                .map_err(|e| ExportError::Connect(format!("logout failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for MailboxSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("MailboxSession dropped without logout");
        }
    }
}

/// The `limit` most recent UIDs from an ascending-sorted list.
///
/// Relies on UID assignment order tracking arrival order, which is an IMAP
/// convention rather than a guarantee; a server that reassigns UIDs after
/// a folder rebuild would break the "most recent" interpretation.
pub fn most_recent(uids: &[u32], limit: usize) -> &[u32] {
    let start = uids.len().saturating_sub(limit);
    &uids[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_takes_tail_slice() {
        // 150 messages, limit 100: exactly the 100 highest UIDs survive
        let uids: Vec<u32> = (1..=150).collect();
        let recent = most_recent(&uids, 100);
        assert_eq!(recent.len(), 100);
        assert_eq!(recent.first(), Some(&51));
        assert_eq!(recent.last(), Some(&150));
    }

    #[test]
    fn test_most_recent_with_fewer_than_limit() {
        let uids: Vec<u32> = vec![3, 7, 9];
        assert_eq!(most_recent(&uids, 100), &[3, 7, 9]);
    }

    #[test]
    fn test_most_recent_preserves_ascending_order() {
        let uids: Vec<u32> = vec![1, 5, 12, 40, 41];
        assert_eq!(most_recent(&uids, 3), &[12, 40, 41]);
    }

    #[test]
    fn test_most_recent_with_empty_input() {
        let uids: Vec<u32> = Vec::new();
        assert!(most_recent(&uids, 10).is_empty());
    }

    #[test]
    fn test_most_recent_zero_limit() {
        let uids: Vec<u32> = vec![1, 2, 3];
        assert!(most_recent(&uids, 0).is_empty());
    }
}
