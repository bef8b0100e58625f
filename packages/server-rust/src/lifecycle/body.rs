//! Response body wrapper that ends the request lifecycle.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

use super::disposal::DisposeOnDrop;

/// Forwards an inner body and drains the request's disposal registry once
/// the last frame has been produced, or when the body is dropped early
/// (client disconnect, error, or a response that is never sent).
pub struct DisposingBody {
    inner: Body,
    guard: Option<DisposeOnDrop>,
}

impl DisposingBody {
    #[must_use]
    pub fn new(inner: Body, guard: DisposeOnDrop) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }
}

impl HttpBody for DisposingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(None) = polled {
            this.guard.take();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::lifecycle::disposal::tests::Recorder;
    use crate::lifecycle::DisposalRegistry;

    fn registry_with_resource() -> (Arc<DisposalRegistry>, Arc<Recorder>) {
        let registry = Arc::new(DisposalRegistry::new());
        let recorder = Recorder::new("body", Arc::new(Mutex::new(Vec::new())));
        registry.register_for_dispose(recorder.clone());
        (registry, recorder)
    }

    #[tokio::test]
    async fn drains_after_body_is_consumed() {
        let (registry, _recorder) = registry_with_resource();
        let body = DisposingBody::new(
            Body::from("payload"),
            DisposeOnDrop::new(registry.clone()),
        );
        let body = Body::new(body);
        assert!(!registry.is_drained());

        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"payload");
        assert!(registry.is_drained());
    }

    #[test]
    fn drains_when_dropped_unread() {
        let (registry, recorder) = registry_with_resource();
        let body = DisposingBody::new(Body::empty(), DisposeOnDrop::new(registry.clone()));
        drop(body);
        assert!(registry.is_drained());
        assert_eq!(recorder.disposed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
