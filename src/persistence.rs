use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Duration};

use log::{debug, error, info, warn};
use tokio::sync::Notify;

use crate::{
    capability::write_text, debounce::Debouncer, handles::SharedHandles,
    registry::SharedRegistry, sync::RemoteSync,
};

/// Text waiting in the debouncer, bound to the file that was selected when it
/// was typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub target: Option<String>,
    pub text: String,
}

/// Sets `isLoading` on creation and clears it on drop, so the flag is reset
/// even when the I/O future is dropped halfway or panics.
struct LoadingGuard {
    registry: SharedRegistry,
    name: String,
}

impl LoadingGuard {
    fn begin(registry: &SharedRegistry, name: &str) -> Self {
        registry.borrow_mut().set_file_loading(name, true);
        Self {
            registry: Rc::clone(registry),
            name: name.to_string(),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        match self.registry.try_borrow_mut() {
            Ok(mut registry) => registry.set_file_loading(&self.name, false),
            Err(_) => error!("Registry busy, {} left in loading state", self.name),
        }
    }
}

/// Counts the writes running per file and wakes waiters when one ends.
#[derive(Default)]
struct RunningWrites {
    running: RefCell<HashMap<String, usize>>,
    done: Notify,
}

impl RunningWrites {
    fn is_running(&self, name: &str) -> bool {
        self.running.borrow().contains_key(name)
    }

    /// Returns once no write to `name` is in flight.
    async fn wait_for(&self, name: &str) {
        loop {
            // Registered before the check so an end in between is not missed
            let done = self.done.notified();
            if !self.is_running(name) {
                return;
            }
            done.await;
        }
    }
}

/// Registers a running write for as long as it lives.
struct WriteGuard {
    writes: Rc<RunningWrites>,
    name: String,
}

impl WriteGuard {
    fn begin(writes: &Rc<RunningWrites>, name: &str) -> Self {
        *writes
            .running
            .borrow_mut()
            .entry(name.to_string())
            .or_default() += 1;
        Self {
            writes: Rc::clone(writes),
            name: name.to_string(),
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.writes.running.try_borrow_mut() {
            if let Some(count) = running.get_mut(&self.name) {
                *count -= 1;
                if *count == 0 {
                    running.remove(&self.name);
                }
            }
        }
        self.writes.done.notify_waiters();
    }
}

#[derive(Clone)]
struct Sinks {
    registry: SharedRegistry,
    handles: SharedHandles,
    remote: Option<Rc<dyn RemoteSync>>,
    writes: Rc<RunningWrites>,
}

impl Sinks {
    async fn persist(&self, write: PendingWrite) {
        let PendingWrite { target, text } = write;
        let Some(name) = target else {
            debug!("No file selected, skipping save");
            return;
        };
        let Some(handle) = self.handles.borrow().get(&name) else {
            debug!("No handle for {}, skipping save", name);
            return;
        };
        let revision = self.registry.borrow().file(&name).map(|file| file.revision);

        let _running = WriteGuard::begin(&self.writes, &name);
        let _loading = LoadingGuard::begin(&self.registry, &name);
        match write_text(handle.as_ref(), &text).await {
            Ok(()) => {
                let current = revision.is_some_and(|revision| {
                    self.registry
                        .borrow_mut()
                        .mark_file_as_saved_if_current(&name, revision)
                });
                if current {
                    info!("File saved: {}", name);
                } else {
                    debug!("File {} written, a newer edit is still pending", name);
                }
                self.push_remote(name, text);
            }
            Err(e) => {
                error!("Error saving file {}: {}", name, e);
                self.registry.borrow_mut().set_file_error(&name, e.to_string());
            }
        }
    }

    fn push_remote(&self, name: String, text: String) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        tokio::task::spawn_local(async move {
            if let Err(e) = remote.save_content(&name, &text).await {
                warn!("Remote sync for {} failed: {}", name, e);
            }
        });
    }
}

/// Reads on select and debounced writes on edit, with every I/O bracketed by
/// the file's loading/error flags in the registry.
pub struct PersistencePipeline {
    sinks: Sinks,
    writer: Debouncer<PendingWrite>,
}

impl PersistencePipeline {
    pub fn new(
        registry: SharedRegistry,
        handles: SharedHandles,
        delay: Duration,
        remote: Option<Rc<dyn RemoteSync>>,
    ) -> Self {
        let sinks = Sinks {
            registry,
            handles,
            remote,
            writes: Rc::default(),
        };
        let for_writer = sinks.clone();
        let writer = Debouncer::new(delay, move |write: PendingWrite| {
            let sinks = for_writer.clone();
            async move { sinks.persist(write).await }
        });
        Self { sinks, writer }
    }

    /// Reads the file from disk into the editor. The content is dropped if the
    /// user moved to another file while the read was in flight. Returns whether
    /// the editor was updated.
    pub async fn load(&self, name: &str) -> bool {
        let Some(handle) = self.sinks.handles.borrow().get(name) else {
            debug!("No handle for {}, keeping editor content", name);
            return false;
        };

        let _loading = LoadingGuard::begin(&self.sinks.registry, name);
        match handle.read().await {
            Ok(content) => {
                let mut registry = self.sinks.registry.borrow_mut();
                if registry.selected_file() == Some(name) {
                    registry.set_editor_text(content);
                    true
                } else {
                    debug!("Discarding stale read of {}", name);
                    false
                }
            }
            Err(e) => {
                error!("Error reading file {}: {}", name, e);
                self.sinks
                    .registry
                    .borrow_mut()
                    .set_file_error(name, e.to_string());
                false
            }
        }
    }

    pub fn schedule_write<S: Into<String>>(&self, target: Option<String>, text: S) {
        self.writer.call(PendingWrite {
            target,
            text: text.into(),
        });
    }

    pub fn has_pending_write(&self) -> bool {
        self.writer.is_pending()
    }

    /// Drops the pending write if it targets `name`.
    pub fn discard_pending_for(&self, name: &str) -> bool {
        let discarded = self
            .writer
            .cancel_where(|write| write.target.as_deref() == Some(name));
        if discarded {
            info!("Discarded unsaved edit of {}", name);
        }
        discarded
    }

    pub fn is_writing(&self, name: &str) -> bool {
        self.sinks.writes.is_running(name)
    }

    /// Writes the pending edit right away if it targets `name` and waits for
    /// any write to `name` already running, so a re-read of that file sees
    /// every edit. Returns whether there was anything to wait for.
    pub async fn flush_pending_for(&self, name: &str) -> bool {
        let pending = self
            .writer
            .is_pending_where(|write| write.target.as_deref() == Some(name));
        let running = self.is_writing(name);
        if pending {
            self.writer.flush().await;
        }
        self.sinks.writes.wait_for(name).await;
        pending || running
    }

    pub fn cancel_pending(&self) {
        self.writer.cancel();
    }

    /// Writes the pending edit now instead of waiting for the debounce window.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }
}
