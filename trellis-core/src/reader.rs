// Content readers: request body to entity parameter

use crate::error::{Error, Result};
use crate::handle::Value;
use crate::http::RequestBody;
use crate::media_type::MediaType;
use crate::resource::TypeKey;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Reads a request body into a value of the target type.
///
/// Called at most once per request, for the entity parameter.
#[async_trait]
pub trait ContentReader: Send + Sync + 'static {
    async fn read(
        &self,
        body: &mut RequestBody,
        content_type: Option<&MediaType>,
        target: &TypeKey,
    ) -> Result<Value>;
}

#[async_trait]
impl<R: ContentReader + ?Sized> ContentReader for Arc<R> {
    async fn read(
        &self,
        body: &mut RequestBody,
        content_type: Option<&MediaType>,
        target: &TypeKey,
    ) -> Result<Value> {
        (**self).read(body, content_type, target).await
    }
}

/// Reader registry keyed by target type.
#[derive(Clone, Default)]
pub struct ContentReaders {
    readers: HashMap<TypeKey, Arc<dyn ContentReader>>,
}

impl ContentReaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `reader` for entities of type `T`.
    pub fn register<T: Any>(&mut self, reader: impl ContentReader) {
        self.register_key(TypeKey::of::<T>(), Arc::new(reader));
    }

    pub fn register_key(&mut self, key: TypeKey, reader: Arc<dyn ContentReader>) {
        self.readers.insert(key, reader);
    }

    /// Read `T` entities as JSON.
    pub fn json<T: DeserializeOwned + Send + 'static>(mut self) -> Self {
        self.register::<T>(JsonReader::<T>::new());
        self
    }

    /// Read `String` entities as UTF-8 text.
    pub fn text(mut self) -> Self {
        self.register::<String>(TextReader);
        self
    }

    pub fn get(&self, key: &TypeKey) -> Option<&Arc<dyn ContentReader>> {
        self.readers.get(key)
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl fmt::Debug for ContentReaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.readers.keys()).finish()
    }
}

/// Deserializes a JSON body into `T`.
pub struct JsonReader<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonReader<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonReader<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> ContentReader for JsonReader<T> {
    async fn read(
        &self,
        body: &mut RequestBody,
        _content_type: Option<&MediaType>,
        target: &TypeKey,
    ) -> Result<Value> {
        let bytes = body.bytes().await?;
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Deserialization(format!("{}: {}", target.simple_name(), e)))?;
        Ok(Box::new(value))
    }
}

/// Reads a UTF-8 body into a `String`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReader;

#[async_trait]
impl ContentReader for TextReader {
    async fn read(
        &self,
        body: &mut RequestBody,
        _content_type: Option<&MediaType>,
        _target: &TypeKey,
    ) -> Result<Value> {
        let bytes = body.bytes().await?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Box::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Gorp {
        name: String,
    }

    #[tokio::test]
    async fn test_json_reader() {
        let readers = ContentReaders::new().json::<Gorp>().text();
        assert_eq!(readers.len(), 2);

        let key = TypeKey::of::<Gorp>();
        let reader = readers.get(&key).unwrap();
        let mut body = RequestBody::from(br#"{"name":"zork"}"#.to_vec());
        let value = reader.read(&mut body, None, &key).await.unwrap();
        assert_eq!(
            *value.downcast::<Gorp>().unwrap(),
            Gorp {
                name: "zork".into()
            }
        );
    }

    #[tokio::test]
    async fn test_json_reader_rejects_bad_body() {
        let key = TypeKey::of::<Gorp>();
        let mut body = RequestBody::from(b"not json".to_vec());
        let err = JsonReader::<Gorp>::new()
            .read(&mut body, None, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_text_reader() {
        let key = TypeKey::of::<String>();
        let mut body = RequestBody::from(b"hello".to_vec());
        let value = TextReader.read(&mut body, None, &key).await.unwrap();
        assert_eq!(*value.downcast::<String>().unwrap(), "hello");
    }
}
