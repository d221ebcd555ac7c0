use tokio::sync::watch;

/// Creates a linked trigger/signal pair.
///
/// Triggering is sticky: once cancelled, every clone of the [`Cancellation`]
/// observes it, including clones created afterwards.
pub fn cancellation() -> (CancelTrigger, Cancellation) {
    let (sender, receiver) = watch::channel(false);
    (CancelTrigger { sender }, Cancellation { receiver })
}

/// Fires the cancellation of an invocation.
#[derive(Debug)]
pub struct CancelTrigger {
    sender: watch::Sender<bool>,
}

impl CancelTrigger {
    /// Cancels every invocation watching the paired [`Cancellation`].
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Cancellation signal passed to [`OperationInvoker::invoke_cancellable`](super::OperationInvoker::invoke_cancellable).
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// Whether the trigger already fired.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the trigger fires; never resolves if the trigger is dropped unfired.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
