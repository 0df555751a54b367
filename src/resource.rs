use async_trait::async_trait;

/// Failure value produced by a resource release.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Something that has to be torn down exactly once during shutdown.
///
/// The coordinator calls [`release`](Releasable::release) once, after every
/// tracked task has finished. Files, listeners and database handles are
/// typical implementors.
///
/// ```
/// use async_trait::async_trait;
/// use conductor::{BoxError, Releasable};
///
/// struct Listener;
///
/// #[async_trait]
/// impl Releasable for Listener {
///     fn name(&self) -> &str {
///         "listener"
///     }
///
///     async fn release(&mut self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Releasable: Send {
    /// Label used in logs and in [`ReleaseError`](crate::ReleaseError).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Tear the resource down.
    async fn release(&mut self) -> Result<(), BoxError>;
}

/// Resource backed by a closure. See [`release_fn`].
pub struct ReleaseFn<F> {
    name: String,
    f: Option<F>,
}

/// Wrap a closure as a [`Releasable`] resource.
///
/// ```
/// let res = conductor::release_fn("scratch dir", || Ok(()));
/// # let _ = res;
/// ```
pub fn release_fn<F>(name: impl Into<String>, f: F) -> ReleaseFn<F>
where
    F: FnOnce() -> Result<(), BoxError> + Send,
{
    ReleaseFn {
        name: name.into(),
        f: Some(f),
    }
}

#[async_trait]
impl<F> Releasable for ReleaseFn<F>
where
    F: FnOnce() -> Result<(), BoxError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&mut self) -> Result<(), BoxError> {
        match self.f.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn closure_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut res = release_fn("counter", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(res.name(), "counter");
        res.release().await.unwrap();
        res.release().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closure_error_is_returned() {
        let mut res = release_fn("broken", || Err("E".into()));
        let err = res.release().await.unwrap_err();
        assert_eq!(err.to_string(), "E");
    }

    #[test]
    fn default_name_is_type_name() {
        struct Plain;

        #[async_trait]
        impl Releasable for Plain {
            async fn release(&mut self) -> Result<(), BoxError> {
                Ok(())
            }
        }

        assert!(Plain.name().ends_with("Plain"));
    }
}
