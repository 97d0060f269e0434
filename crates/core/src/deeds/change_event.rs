//! Change notifications delivered by the realtime feed.

use tokio::sync::{mpsc, oneshot};

use super::deeds_model::Deed;

/// A row-level change on the deeds table.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Deed),
    Update(Deed),
    /// Deletion payloads only reliably carry the primary key.
    Delete { id: String },
}

impl ChangeEvent {
    pub fn deed_id(&self) -> &str {
        match self {
            ChangeEvent::Insert(deed) | ChangeEvent::Update(deed) => &deed.id,
            ChangeEvent::Delete { id } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Insert(_) => "INSERT",
            ChangeEvent::Update(_) => "UPDATE",
            ChangeEvent::Delete { .. } => "DELETE",
        }
    }
}

/// An open realtime channel.
///
/// Events arrive on an unbounded queue. Closing the subscription (explicitly
/// or by dropping it) tells the feed to leave the channel.
#[derive(Debug)]
pub struct ChangeSubscription {
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl ChangeSubscription {
    /// Creates a subscription plus the handles the feed keeps: the event sender
    /// and a receiver that resolves once the subscriber goes away.
    pub fn channel() -> (
        Self,
        mpsc::UnboundedSender<ChangeEvent>,
        oneshot::Receiver<()>,
    ) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                events,
                close_tx: Some(close_tx),
            },
            event_tx,
            close_rx,
        )
    }

    /// Next event, or `None` once the feed has shut down.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        self.events.close();
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
