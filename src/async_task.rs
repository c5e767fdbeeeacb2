//! Async task wrapper for boxing futures behind object-safe traits

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed, sendable future returned from trait methods
pub struct AsyncTask<T>(Pin<Box<dyn Future<Output = T> + Send + 'static>>);

impl<T> AsyncTask<T> {
    /// Construct from a future
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        AsyncTask(Box::pin(fut))
    }

    /// Task that is already complete
    pub fn ready(value: T) -> Self
    where
        T: Send + 'static,
    {
        Self::from_future(std::future::ready(value))
    }
}

impl<T> Future for AsyncTask<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}
