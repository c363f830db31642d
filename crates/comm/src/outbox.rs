use tokio::sync::{mpsc, Mutex};

use crate::message::WireMessage;

/// A single-producer single-consumer FIFO of wire messages. `deposit` never
/// blocks; `retrieve` blocks until a message is available. Created lazily by
/// [`crate::post_office::PostOffice`] on first send to a given receiver.
pub struct Outbox {
    sender: mpsc::UnboundedSender<WireMessage>,
    receiver: Mutex<mpsc::UnboundedReceiver<WireMessage>>,
}

impl Outbox {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Never blocks: backed by an unbounded channel.
    pub fn deposit(&self, msg: WireMessage) {
        let _ = self.sender.send(msg);
    }

    /// Blocks until a message is available. Single consumer only.
    pub async fn retrieve(&self) -> Option<WireMessage> {
        self.receiver.lock().await.recv().await
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::message::PayloadValue;
    use coupler_core::Settings;

    fn wire(payload: i64) -> WireMessage {
        let msg = Message::new(0.0, None, PayloadValue::Int(payload));
        WireMessage::encode("a.out", "b.in", &msg, &Settings::new()).unwrap()
    }

    #[tokio::test]
    async fn fifo_within_a_single_stream() {
        let outbox = Outbox::new();
        outbox.deposit(wire(1));
        outbox.deposit(wire(2));
        outbox.deposit(wire(3));

        for expected in [1, 2, 3] {
            let got = outbox.retrieve().await.unwrap();
            let (msg, _) = got.decode().unwrap();
            assert_eq!(msg.data, PayloadValue::Int(expected));
        }
    }

    #[tokio::test]
    async fn retrieve_blocks_until_deposit_arrives() {
        let outbox = std::sync::Arc::new(Outbox::new());
        let reader = {
            let outbox = outbox.clone();
            tokio::spawn(async move { outbox.retrieve().await })
        };
        tokio::task::yield_now().await;
        outbox.deposit(wire(9));
        let got = reader.await.unwrap().unwrap();
        let (msg, _) = got.decode().unwrap();
        assert_eq!(msg.data, PayloadValue::Int(9));
    }
}
