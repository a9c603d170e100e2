//! Ordered fallback over evidence sources.
//!
//! Every source answers with a tri-state: a value, nothing (`Ok(None)`), or an
//! error. Sources are tried strictly in order. The first value wins and the
//! first error aborts; only "nothing" moves on to the next source. Sources
//! are futures, so one that is never reached never runs.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use crate::Result;

/// The answer of a single evidence source.
pub type Evidence = Result<Option<String>>;

/// A named, ordered list of evidence sources.
pub struct FallbackChain<'a> {
    name: &'static str,
    sources: Vec<(&'static str, BoxFuture<'a, Evidence>)>,
}

impl<'a> FallbackChain<'a> {
    /// Start an empty chain.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sources: Vec::new(),
        }
    }

    /// Append a source. It only runs if every earlier source found nothing.
    #[must_use]
    pub fn then<F>(mut self, source: &'static str, probe: F) -> Self
    where
        F: Future<Output = Evidence> + Send + 'a,
    {
        self.sources.push((source, probe.boxed()));
        self
    }

    /// Number of sources in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the chain has no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Run the sources in order until one yields a value or an error.
    ///
    /// Empty strings are treated as "nothing".
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a source.
    pub async fn resolve(self) -> Evidence {
        for (source, probe) in self.sources {
            debug!(chain = self.name, source, "Trying evidence source");

            if let Some(value) = probe.await?.filter(|v| !v.is_empty()) {
                info!(chain = self.name, source, value = %value, "Evidence source yielded a value");
                return Ok(Some(value));
            }
        }

        debug!(chain = self.name, "All evidence sources exhausted");
        Ok(None)
    }
}
