use futures::channel::mpsc;

/// Entry point into a connection's owner task.
///
/// Work that completes elsewhere (a handler task producing a response, a client submitting a
/// request) is resubmitted here as a command instead of touching connection state directly. The
/// connection task drains the receiving side in its event loop.
#[derive(Debug)]
pub(crate) struct OwnerHandle<C> {
    sender: mpsc::UnboundedSender<C>,
}

impl<C> OwnerHandle<C> {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<C>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }

    /// Hands `command` to the owner. Returns it back if the connection is gone.
    pub(crate) fn submit(&self, command: C) -> Result<(), C> {
        self.sender.unbounded_send(command).map_err(mpsc::TrySendError::into_inner)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<C> Clone for OwnerHandle<C> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn commands_from_one_handle_keep_their_order() {
        let (handle, mut receiver) = OwnerHandle::channel();
        for command in 1..=3 {
            handle.submit(command).unwrap();
        }

        let received: Vec<_> = receiver.by_ref().take(3).collect().await;
        assert_eq!(received, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn every_handle_reaches_the_owner() {
        let (handle, mut receiver) = OwnerHandle::channel();
        let other = handle.clone();

        let task = tokio::spawn(async move { other.submit(2).unwrap() });
        handle.submit(1).unwrap();
        task.await.unwrap();

        let mut received = vec![receiver.next().await.unwrap(), receiver.next().await.unwrap()];
        received.sort();
        assert_eq!(received, vec![1, 2]);

        drop(receiver);
        assert!(handle.is_closed());
        assert_eq!(handle.submit(3), Err(3));
    }
}
