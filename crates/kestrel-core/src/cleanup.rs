//! # Cleanup Chain
//!
//! Deferred teardown actions registered against a program.
//!
//! Building a program is a sequence of acquisitions (open a file, parse its
//! headers, attach to a process, load debug info) where any step can fail
//! after earlier ones succeeded. Each step registers a cleanup right after it
//! succeeds; the chain runs them newest-first exactly once, either when the
//! program is dropped or, after a partial failure, when the half-built chain
//! is dropped.
//!
//! ## Identity
//!
//! An entry is a value implementing [`Cleanup`]. Its type stands for "which
//! action" and its value stands for "on what", so
//! [`CleanupChain::unregister`] removes the newest entry of the same type
//! that compares equal.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use kestrel_core::cleanup::{Cleanup, CleanupChain};
//!
//! struct Note(&'static str, Arc<Mutex<Vec<&'static str>>>);
//!
//! impl Cleanup for Note
//! {
//!     fn run(self: Box<Self>)
//!     {
//!         self.1.lock().unwrap().push(self.0);
//!     }
//! }
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let mut chain = CleanupChain::new();
//! chain.register(Note("first", log.clone()))?;
//! chain.register(Note("second", log.clone()))?;
//! chain.run_all_and_clear();
//! assert_eq!(*log.lock().unwrap(), ["second", "first"]);
//! # Ok::<(), kestrel_core::error::KestrelError>(())
//! ```

use std::any::Any;
use std::fmt;

use tracing::trace;

use crate::error::{KestrelError, Result};

/// A deferred teardown action.
///
/// `run` consumes the entry, so an action can never fire twice.
pub trait Cleanup: Send + 'static
{
    /// Perform the teardown.
    fn run(self: Box<Self>);
}

/// Object-safe view of a [`Cleanup`] that can also be matched by type.
trait ErasedCleanup: Send
{
    fn run_boxed(self: Box<Self>);

    fn as_any(&self) -> &dyn Any;
}

impl<C: Cleanup> ErasedCleanup for C
{
    fn run_boxed(self: Box<Self>)
    {
        Cleanup::run(self);
    }

    fn as_any(&self) -> &dyn Any
    {
        self
    }
}

/// Last-in, first-out list of cleanup actions
///
/// The newest entry lives at the end of the backing vector; running the chain
/// pops from the end.
///
/// Dropping a chain that still holds entries runs them, which is what unwinds
/// a partially built program.
#[derive(Default)]
pub struct CleanupChain
{
    entries: Vec<Box<dyn ErasedCleanup>>,
}

impl CleanupChain
{
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self
    {
        Self { entries: Vec::new() }
    }

    /// Push a new entry onto the chain.
    ///
    /// ## Errors
    ///
    /// `AllocationFailed` if the chain can't grow. The entry is dropped
    /// without running in that case; callers should unwind.
    pub fn register<C: Cleanup>(&mut self, cleanup: C) -> Result<()>
    {
        self.entries
            .try_reserve(1)
            .map_err(|err| KestrelError::AllocationFailed(format!("registering cleanup: {err}")))?;
        self.entries.push(Box::new(cleanup));
        Ok(())
    }

    /// Remove the most recently registered entry equal to `cleanup`.
    ///
    /// The removed entry is dropped without running. Returns `false` if no
    /// entry matched.
    pub fn unregister<C: Cleanup + PartialEq>(&mut self, cleanup: &C) -> bool
    {
        let position = self
            .entries
            .iter()
            .rposition(|entry| entry.as_any().downcast_ref::<C>() == Some(cleanup));
        match position {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Run every entry, newest first, and leave the chain empty.
    pub fn run_all_and_clear(&mut self)
    {
        if !self.entries.is_empty() {
            trace!(count = self.entries.len(), "running cleanup chain");
        }
        while let Some(entry) = self.entries.pop() {
            entry.run_boxed();
        }
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

impl Drop for CleanupChain
{
    fn drop(&mut self)
    {
        self.run_all_and_clear();
    }
}

impl fmt::Debug for CleanupChain
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("CleanupChain").field("len", &self.entries.len()).finish()
    }
}

/// Cleanup entry that owns an acquired resource and releases it when run.
///
/// Initializers hand file handles and similar resources to the chain through
/// `Release` so they are torn down in reverse acquisition order.
pub struct Release<T: Send + 'static>
{
    what: &'static str,
    resource: T,
}

impl<T: Send + 'static> Release<T>
{
    pub fn new(what: &'static str, resource: T) -> Self
    {
        Self { what, resource }
    }

    /// Short description of the held resource.
    pub fn what(&self) -> &'static str
    {
        self.what
    }
}

impl<T: Send + 'static> Cleanup for Release<T>
{
    fn run(self: Box<Self>)
    {
        trace!(resource = self.what, "releasing");
        drop(self.resource);
    }
}
