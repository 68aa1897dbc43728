//! Consumer thread spawning and CPU pinning
//!
//! Stage threads are named after their stage (`<disruptor>.c1`, `<disruptor>.c2`) and can
//! be pinned to a core. Core ids are checked before anything is spawned, so a bad
//! `consumer_cores` entry fails construction instead of leaving half a pipeline running.

use crate::disruptor::{DisruptorError, Result};
use core_affinity::CoreId;
use std::thread::{self, JoinHandle};

/// A named, optionally pinned consumer thread
///
/// Dropping it joins the thread.
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Wait for the thread to finish
    ///
    /// # Errors
    /// Returns the panic payload if the thread panicked.
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::error!(thread = %self.thread_name, "consumer thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Builder for stage threads
#[derive(Debug, Clone)]
pub struct ThreadBuilder {
    name: String,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affinity: None,
        }
    }

    /// Pin the thread to `core_id`
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidCoreId` if the core is not available on this machine.
    pub fn pin_at_core(mut self, core_id: usize) -> Result<Self> {
        validate_core_id(core_id)?;
        self.affinity = Some(CoreId { id: core_id });
        Ok(self)
    }

    /// Spawn the thread
    ///
    /// # Errors
    /// Returns `DisruptorError::ThreadSpawn` if the OS refuses the thread.
    pub fn spawn<F>(self, f: F) -> Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let Self { name, affinity } = self;
        let thread_name = name.clone();
        let join_handle = thread::Builder::new().name(name.clone()).spawn(move || {
            set_affinity_if_defined(affinity, &thread_name);
            f();
        })?;

        Ok(ManagedThread {
            join_handle: Some(join_handle),
            thread_name: name,
        })
    }
}

/// Check that `core_id` names a core this process may run on
///
/// # Errors
/// Returns `DisruptorError::InvalidCoreId` listing the available cores.
pub fn validate_core_id(core_id: usize) -> Result<()> {
    let available = get_available_cores();
    if available.contains(&core_id) {
        Ok(())
    } else {
        Err(DisruptorError::InvalidCoreId {
            core: core_id,
            available,
        })
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            tracing::debug!(thread = thread_name, core = core_id.id, "pinned consumer thread");
        } else {
            tracing::warn!(thread = thread_name, core = core_id.id, "could not pin consumer thread");
        }
    }
}

/// Core ids available to this process
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
