//! Reentrant HTTP connection handle.
//!
//! Every request takes a [`ClientLease`]. Nested leases (a `login()` issued
//! from inside a `request()` retry) reuse the same pooled client; the pool is
//! only torn down when the outermost lease is dropped.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use ea_domain::error::{Error, Result};
use parking_lot::Mutex;
use reqwest::Client;

#[derive(Debug, Default)]
struct Slot {
    client: Option<Client>,
    depth: usize,
    /// Bumped every time a fresh client is built.
    generation: u64,
}

#[derive(Debug)]
pub struct SharedClient {
    request_timeout: Duration,
    user_agent: Option<String>,
    slot: Mutex<Slot>,
}

impl SharedClient {
    pub fn new(request_timeout: Duration, user_agent: Option<String>) -> Self {
        Self {
            request_timeout,
            user_agent,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Take a lease, building the client if no lease is outstanding.
    pub fn acquire(self: &Arc<Self>) -> Result<ClientLease> {
        let mut slot = self.slot.lock();
        let client = match &slot.client {
            Some(client) => client.clone(),
            None => {
                let client = self.build()?;
                slot.client = Some(client.clone());
                slot.generation += 1;
                tracing::debug!(generation = slot.generation, "opened http client");
                client
            }
        };
        slot.depth += 1;
        Ok(ClientLease {
            owner: Arc::clone(self),
            client,
            generation: slot.generation,
        })
    }

    /// Number of outstanding leases.
    pub fn depth(&self) -> usize {
        self.slot.lock().depth
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().client.is_some()
    }

    fn build(&self) -> Result<Client> {
        let mut builder = Client::builder().timeout(self.request_timeout);
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.as_str());
        }
        builder.build().map_err(|e| Error::Http(e.to_string()))
    }

    fn release(&self) {
        let mut slot = self.slot.lock();
        slot.depth = slot.depth.saturating_sub(1);
        if slot.depth == 0 && slot.client.take().is_some() {
            tracing::debug!(generation = slot.generation, "closed http client");
        }
    }
}

/// A borrowed handle on the shared client. Derefs to [`reqwest::Client`].
#[derive(Debug)]
pub struct ClientLease {
    owner: Arc<SharedClient>,
    client: Client,
    generation: u64,
}

impl ClientLease {
    /// Identifies which underlying client this lease shares.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for ClientLease {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        self.owner.release();
    }
}

/// Map a transport error onto the shared error type.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
