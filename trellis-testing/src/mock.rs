// Counting doubles for providers, readers and resources

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use trellis_core::{
    ContentReader, Instance, MediaType, RequestBody, ResourceProvider, Result, TypeKey, Value,
};

/// Wraps a provider and counts `get` and `release`
pub struct CountingProvider<P> {
    inner: P,
    gets: AtomicUsize,
    releases: AtomicUsize,
}

impl<P: ResourceProvider> CountingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Every acquired instance has been released
    pub fn is_balanced(&self) -> bool {
        self.gets() == self.releases()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: ResourceProvider> ResourceProvider for CountingProvider<P> {
    async fn get(&self, key: &TypeKey) -> Result<Instance> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    fn release(&self, key: &TypeKey, instance: Instance) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release(key, instance);
    }
}

/// Wraps a content reader and counts reads
pub struct CountingReader {
    inner: Arc<dyn ContentReader>,
    reads: AtomicUsize,
}

impl CountingReader {
    pub fn new(inner: impl ContentReader) -> Self {
        Self {
            inner: Arc::new(inner),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentReader for CountingReader {
    async fn read(
        &self,
        body: &mut RequestBody,
        content_type: Option<&MediaType>,
        target: &TypeKey,
    ) -> Result<Value> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(body, content_type, target).await
    }
}

/// Records named calls; clones share the log
#[derive(Clone, Default)]
pub struct Spy {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<String>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, method: &str) {
        self.log().push(method.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.log().len()
    }

    pub fn count_of(&self, method: &str) -> usize {
        self.log().iter().filter(|m| *m == method).count()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.log().iter().any(|m| m == method)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log().clone()
    }

    pub fn clear(&self) {
        self.log().clear();
    }
}
