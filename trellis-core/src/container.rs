// Default resource instance provider

use crate::error::{Error, Result};
use crate::handle::Instance;
use crate::logging::{debug, trace};
use crate::resource::TypeKey;
use crate::traits::ResourceProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Result<Instance> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    /// One shared instance for every request
    Singleton(Instance),
    /// A fresh instance per request
    Factory(Factory),
}

/// In-memory resource instance container.
///
/// Cloning shares the registrations.
#[derive(Clone, Default)]
pub struct Container {
    entries: Arc<RwLock<HashMap<TypeKey, Registration>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new resource container");
        Self::default()
    }

    /// Register a shared instance of `T`
    pub fn register<T: Any + Send + Sync>(&self, instance: T) {
        self.register_instance(TypeKey::of::<T>(), Arc::new(instance));
    }

    /// Register a shared instance under an explicit key
    pub fn register_instance(&self, key: TypeKey, instance: Instance) {
        trace!(resource = %key, "Registering singleton");
        self.entries.write().insert(key.clone(), Registration::Singleton(instance));
        debug!(resource = %key, "Singleton registered in container");
    }

    /// Register a factory producing a new `T` per request
    pub fn register_factory<T, F>(&self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let factory: Factory = Arc::new(move || Ok(Arc::new(factory()) as Instance));
        self.entries.write().insert(key.clone(), Registration::Factory(factory));
        debug!(resource = %key, "Factory registered in container");
    }

    /// Resolve a typed instance
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let instance = self.instance(&TypeKey::of::<T>())?;
        instance.downcast::<T>().map_err(|_| Error::Resolution {
            resource: type_name::<T>().to_string(),
            reason: "registered instance has a different type".to_string(),
        })
    }

    /// Check if a type is registered
    pub fn has(&self, key: &TypeKey) -> bool {
        let exists = self.entries.read().contains_key(key);
        trace!(resource = %key, exists, "Checked registration");
        exists
    }

    /// Clear all registrations
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        debug!(count, "Cleared all registrations from container");
    }

    fn instance(&self, key: &TypeKey) -> Result<Instance> {
        let registration = self.entries.read().get(key).cloned();
        match registration {
            Some(Registration::Singleton(instance)) => Ok(instance),
            Some(Registration::Factory(factory)) => factory(),
            None => Err(Error::Resolution {
                resource: key.to_string(),
                reason: "not registered".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ResourceProvider for Container {
    async fn get(&self, key: &TypeKey) -> Result<Instance> {
        trace!(resource = %key, "Resolving resource instance");
        self.instance(key)
    }

    fn release(&self, key: &TypeKey, instance: Instance) {
        trace!(
            resource = %key,
            shared = Arc::strong_count(&instance) > 1,
            "Releasing resource instance"
        );
    }
}
