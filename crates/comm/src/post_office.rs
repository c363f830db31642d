use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::message::WireMessage;
use crate::outbox::Outbox;

/// Registry of [`Outbox`]es keyed by receiver-instance reference string.
/// Map-structure mutation (insert-if-absent) and lookup are serialized
/// through the mutex; once an `Arc<Outbox>` is obtained, deposit/retrieve on
/// it proceed without holding the map lock.
#[derive(Clone, Default)]
pub struct PostOffice {
    outboxes: Arc<Mutex<HashMap<String, Arc<Outbox>>>>,
}

impl PostOffice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits `msg` into the outbox for `receiver_ref`, creating it on
    /// first use.
    pub async fn deposit(&self, receiver_ref: &str, msg: WireMessage) {
        let outbox = self.ensure_outbox(receiver_ref).await;
        outbox.deposit(msg);
    }

    /// The server-side drain path: returns the next message queued for
    /// `receiver_ref`, blocking until one arrives.
    pub async fn retrieve(&self, receiver_ref: &str) -> Option<WireMessage> {
        let outbox = self.ensure_outbox(receiver_ref).await;
        outbox.retrieve().await
    }

    async fn ensure_outbox(&self, receiver_ref: &str) -> Arc<Outbox> {
        let mut outboxes = self.outboxes.lock().await;
        outboxes
            .entry(receiver_ref.to_string())
            .or_insert_with(|| Arc::new(Outbox::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, PayloadValue};
    use coupler_core::Settings;

    fn wire(payload: i64) -> WireMessage {
        let msg = Message::new(0.0, None, PayloadValue::Int(payload));
        WireMessage::encode("a.out", "b.in", &msg, &Settings::new()).unwrap()
    }

    #[tokio::test]
    async fn first_deposit_creates_the_outbox() {
        let office = PostOffice::new();
        office.deposit("b.in", wire(1)).await;
        let got = office.retrieve("b.in").await.unwrap();
        let (msg, _) = got.decode().unwrap();
        assert_eq!(msg.data, PayloadValue::Int(1));
    }

    #[tokio::test]
    async fn distinct_receivers_get_distinct_outboxes() {
        let office = PostOffice::new();
        office.deposit("first.in", wire(1)).await;
        office.deposit("second.in", wire(2)).await;

        let first = office.retrieve("first.in").await.unwrap().decode().unwrap().0;
        let second = office.retrieve("second.in").await.unwrap().decode().unwrap().0;
        assert_eq!(first.data, PayloadValue::Int(1));
        assert_eq!(second.data, PayloadValue::Int(2));
    }
}
