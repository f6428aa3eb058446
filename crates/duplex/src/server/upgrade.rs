//! Protocol upgrade handoff.
//!
//! Requests carrying an `Upgrade` header get an [`OnUpgrade`] in their extensions. A handler that
//! answers `101 Switching Protocols` keeps it and awaits [`OnUpgrade::upgraded`] on a task of its
//! own: once the 101 is written the connection stops and hands over the raw transport, with the
//! bytes it had already read. A handshake the server cannot accept is answered with
//! `426 Upgrade Required` instead, and `upgraded` fails.

use std::sync::Arc;

use bytes::BytesMut;
use futures::channel::oneshot;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// The transport of an upgraded connection.
pub struct Upgraded {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Bytes read past the request head, already belonging to the new protocol.
    pub read_buf: BytesMut,
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgraded").field("read_buf", &self.read_buf.len()).finish_non_exhaustive()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("upgrade was declined")]
    Declined,

    #[error("upgrade already taken")]
    AlreadyTaken,
}

pub(crate) type PendingUpgrade = oneshot::Sender<Upgraded>;

/// Resolves to the upgraded transport once the handshake response is written.
#[derive(Clone, Debug)]
pub struct OnUpgrade {
    receiver: Arc<Mutex<Option<oneshot::Receiver<Upgraded>>>>,
}

impl OnUpgrade {
    pub(crate) fn pair() -> (PendingUpgrade, OnUpgrade) {
        let (sender, receiver) = oneshot::channel();
        (sender, OnUpgrade { receiver: Arc::new(Mutex::new(Some(receiver))) })
    }

    pub async fn upgraded(self) -> Result<Upgraded, UpgradeError> {
        let receiver = self.receiver.lock().take().ok_or(UpgradeError::AlreadyTaken)?;
        receiver.await.map_err(|oneshot::Canceled| UpgradeError::Declined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_sender_declines() {
        let (sender, on_upgrade) = OnUpgrade::pair();
        let second = on_upgrade.clone();
        drop(sender);

        assert_eq!(on_upgrade.upgraded().await.unwrap_err(), UpgradeError::Declined);
        assert_eq!(second.upgraded().await.unwrap_err(), UpgradeError::AlreadyTaken);
    }
}
