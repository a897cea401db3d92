//! Object Store Adapter
//!
//! Blob-addressed view of the metadata pool: named objects, whole-object
//! reads, atomic whole-object replacement. The adapter's one load-bearing
//! job is keeping the two error planes apart:
//!
//! - an absent object is a *data condition* ([`ReadOutcome::Missing`]) that
//!   a forensic scan records and survives;
//! - every other store failure is an operational error that aborts the
//!   caller.
//!
//! Backed by any [`ObjectStore`] implementation: a local directory in the
//! CLI, `InMemory` in tests, a real blob store in production.

use std::sync::Arc;

use bytes::Bytes;
use object_store::{path::Path, ObjectStore};

use crate::error::Result;

/// Outcome of reading a named object.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Present(Bytes),
    Missing,
}

/// Blob-addressed client for the metadata pool.
#[derive(Clone)]
pub struct PoolClient {
    store: Arc<dyn ObjectStore>,
}

impl PoolClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Read a whole object.
    pub async fn read(&self, name: &str) -> Result<ReadOutcome> {
        match self.store.get(&Path::from(name)).await {
            Ok(result) => Ok(ReadOutcome::Present(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(ReadOutcome::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace a whole object.
    pub async fn write_full(&self, name: &str, data: Bytes) -> Result<()> {
        self.store.put(&Path::from(name), data.into()).await?;
        Ok(())
    }
}
