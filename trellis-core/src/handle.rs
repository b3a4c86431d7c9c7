// Method handles: the invocable half of a resource method declaration

use crate::error::{BoxError, Error};
use crate::http::HttpResponse;
use crate::media_type::MediaType;
use bytes::Bytes;
use serde::Serialize;
use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A resource instance as handed out by a provider.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A single resolved argument value.
pub type Value = Box<dyn Any + Send>;

/// Future returned by a method handle.
pub type HandleFuture = Pin<Box<dyn Future<Output = Result<Reply, BoxError>> + Send>>;

type HandleFn = dyn Fn(Instance, Args) -> HandleFuture + Send + Sync;

/// Positional arguments for one invocation, in declared parameter order.
pub struct Args {
    values: Vec<Option<Value>>,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Move the argument at `index` out, downcast to `T`.
    pub fn take<T: Any + Send>(&mut self, index: usize) -> Result<T, Error> {
        let slot = self.values.get_mut(index).ok_or_else(|| {
            Error::Internal(format!("no argument at position {}", index))
        })?;
        let value = slot.take().ok_or_else(|| {
            Error::Internal(format!("argument at position {} already taken", index))
        })?;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => {
                // put it back so a second attempt with the right type works
                *slot = Some(value);
                Err(Error::Internal(format!(
                    "argument at position {} is not a {}",
                    index,
                    type_name::<T>()
                )))
            }
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.values.len()).finish()
    }
}

/// What a resource method produced.
#[derive(Debug)]
pub enum Reply {
    /// Nothing to write; sent as 204
    Empty,
    /// A JSON document
    Json(serde_json::Value),
    /// Plain text
    Text(String),
    /// Raw bytes, optionally with their own media type
    Bytes {
        body: Bytes,
        media_type: Option<MediaType>,
    },
    /// A fully built response, written as-is
    Response(HttpResponse),
}

impl Reply {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Reply::Text(value.into())
    }

    pub fn bytes(body: impl Into<Bytes>, media_type: Option<MediaType>) -> Self {
        Reply::Bytes {
            body: body.into(),
            media_type,
        }
    }
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Reply::Response(response)
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Text(value)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

/// Opaque, cheaply clonable handle bound to one concrete method at startup.
#[derive(Clone)]
pub struct MethodHandle {
    inner: Arc<HandleFn>,
}

impl MethodHandle {
    /// Wrap a closure taking the type-erased instance.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Instance, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, BoxError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |instance, args| Box::pin(f(instance, args))),
        }
    }

    /// Wrap a closure taking the concrete resource type `R`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use trellis_core::handle::{MethodHandle, Reply};
    ///
    /// struct Greeter;
    ///
    /// let handle = MethodHandle::on(|_this: Arc<Greeter>, mut args| async move {
    ///     let name: String = args.take(0)?;
    ///     Ok(Reply::text(format!("hello {}", name)))
    /// });
    /// # let _ = handle;
    /// ```
    pub fn on<R, F, Fut>(f: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(Arc<R>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, BoxError>> + Send + 'static,
    {
        Self::new(move |instance: Instance, args| {
            let call = instance.downcast::<R>().map(|this| f(this, args));
            async move {
                match call {
                    Ok(fut) => fut.await,
                    Err(_) => Err(Box::new(Error::Internal(format!(
                        "resource instance is not a {}",
                        type_name::<R>()
                    ))) as BoxError),
                }
            }
        })
    }

    pub fn invoke(&self, instance: Instance, args: Args) -> HandleFuture {
        (self.inner)(instance, args)
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MethodHandle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        base: u32,
    }

    #[test]
    fn test_args_take() {
        let mut args = Args::new(vec![Box::new(7u32), Box::new("x".to_string())]);
        assert_eq!(args.len(), 2);
        assert!(args.take::<String>(0).is_err());
        assert_eq!(args.take::<u32>(0).unwrap(), 7);
        assert!(args.take::<u32>(0).is_err());
        assert_eq!(args.take::<String>(1).unwrap(), "x");
        assert!(args.take::<u32>(2).is_err());
    }

    #[tokio::test]
    async fn test_typed_handle_invocation() {
        let handle = MethodHandle::on(|this: Arc<Counter>, mut args| async move {
            let n: u32 = args.take(0)?;
            Ok(Reply::json(&(this.base + n))?)
        });
        let instance: Instance = Arc::new(Counter { base: 40 });
        let reply = handle
            .invoke(instance, Args::new(vec![Box::new(2u32)]))
            .await
            .unwrap();
        match reply {
            Reply::Json(v) => assert_eq!(v, serde_json::json!(42)),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_typed_handle_wrong_instance() {
        let handle = MethodHandle::on(|_this: Arc<Counter>, _args| async move { Ok(Reply::Empty) });
        let instance: Instance = Arc::new("not a counter");
        assert!(handle.invoke(instance, Args::empty()).await.is_err());
    }
}
