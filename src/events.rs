//! Minimal named-event dispatch for output observers.
//!
//! Both transports raise a single event, [`OUTPUT_EVENT`], once per chunk of
//! text read from Composer, so a caller can stream progress live. Handlers
//! fire in ascending priority order (registration order breaks ties), and a
//! failing handler never prevents delivery to the remaining ones.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::output::OutputChannel;

/// The event raised for every chunk of output streamed from a transport.
pub const OUTPUT_EVENT: &str = "output";

/// An output observer. Receives the source component id, the data chunk and
/// the channel the chunk arrived on.
pub type Callback = Arc<dyn Fn(&str, &str, OutputChannel) -> anyhow::Result<()> + Send + Sync>;

/// Failures collected from event callbacks. Delivery continues past a failing
/// callback, so one dispatch can report several.
#[derive(Debug, thiserror::Error)]
#[error("{} output callback(s) failed", .errors.len())]
pub struct EventErrors {
    pub errors: Vec<anyhow::Error>,
}

struct Handler {
    callback: Callback,
    priority: i32,
}

/// Registry of named events and their prioritized handlers.
#[derive(Default)]
pub struct Events {
    handlers: HashMap<String, Vec<Handler>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`. Registering the exact same callback a
    /// second time for the same event is ignored. Lower priorities fire
    /// first.
    pub fn add_event(&mut self, event: &str, callback: Callback, priority: i32) {
        let handlers = self.handlers.entry(event.to_string()).or_default();

        if handlers
            .iter()
            .any(|handler| Arc::ptr_eq(&handler.callback, &callback))
        {
            return;
        }

        handlers.push(Handler { callback, priority });
    }

    /// Fire `event`, delivering the payload to every handler. Callback
    /// failures are aggregated and reported after all handlers ran.
    pub fn fire(
        &self,
        event: &str,
        source: &str,
        chunk: &str,
        channel: OutputChannel,
    ) -> Result<(), EventErrors> {
        let Some(handlers) = self.handlers.get(event) else {
            return Ok(());
        };

        let mut ordered: Vec<&Handler> = handlers.iter().collect();
        // Stable sort: handlers with equal priority keep registration order.
        ordered.sort_by_key(|handler| handler.priority);

        let mut errors = Vec::new();
        for handler in ordered {
            if let Err(error) = (handler.callback)(source, chunk, channel) {
                errors.push(error);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EventErrors { errors })
        }
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_map();
        for (event, handlers) in &self.handlers {
            debug.entry(event, &handlers.len());
        }
        debug.finish()
    }
}
