use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;

use crate::error::CommError;
use crate::message::WireMessage;
use crate::post_office::PostOffice;
use crate::transport::{TransportClient, TransportServer};

const SCHEME: &str = "local";

fn directory() -> &'static Mutex<HashMap<String, PostOffice>> {
    static DIR: OnceLock<Mutex<HashMap<String, PostOffice>>> = OnceLock::new();
    DIR.get_or_init(|| Mutex::new(HashMap::new()))
}

/// In-process transport used by tests and single-process ensembles: the
/// client reaches the server's [`PostOffice`] directly through a process-wide
/// directory keyed by location string, bypassing the network entirely.
pub struct LocalTransportServer {
    location: String,
}

impl LocalTransportServer {
    pub fn bind(name: &str, post_office: PostOffice) -> Self {
        let location = format!("{SCHEME}:{name}");
        directory()
            .lock()
            .unwrap()
            .insert(location.clone(), post_office);
        Self { location }
    }
}

#[async_trait]
impl TransportServer for LocalTransportServer {
    fn location(&self) -> String {
        self.location.clone()
    }

    async fn shutdown(&self) {
        directory().lock().unwrap().remove(&self.location);
    }
}

pub struct LocalTransportClient {
    post_office: PostOffice,
}

impl LocalTransportClient {
    pub fn connect(location: &str) -> Result<Self, CommError> {
        let post_office = directory()
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| CommError::TransportError(format!("no local server at {location}")))?;
        Ok(Self { post_office })
    }
}

#[async_trait]
impl TransportClient for LocalTransportClient {
    fn can_connect_to(location: &str) -> bool {
        location.starts_with(&format!("{SCHEME}:"))
    }

    async fn receive(&self, receiver_ref: &str) -> Result<WireMessage, CommError> {
        self.post_office
            .retrieve(receiver_ref)
            .await
            .ok_or_else(|| CommError::TransportError("outbox closed".to_string()))
    }
}
