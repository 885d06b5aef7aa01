//! Listener system for circuit breaker state transitions

use std::sync::Arc;

/// Observer of circuit transitions
///
/// Called synchronously, in registration order, by the thread performing the
/// transition. Implementations must not block or call back into the breaker.
pub trait CircuitListener: Send + Sync {
    fn on_open(&self, _circuit: &str) {}
    fn on_half_open(&self, _circuit: &str) {}
    fn on_closed(&self, _circuit: &str) {}
}

type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// Listener assembled from closures
#[derive(Clone, Default)]
pub struct Callbacks {
    on_open: Option<Callback>,
    on_half_open: Option<Callback>,
    on_closed: Option<Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_half_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_closed = Some(Arc::new(f));
        self
    }

    pub fn trigger_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_open {
            callback(circuit);
        }
    }

    pub fn trigger_half_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_half_open {
            callback(circuit);
        }
    }

    pub fn trigger_closed(&self, circuit: &str) {
        if let Some(ref callback) = self.on_closed {
            callback(circuit);
        }
    }
}

// Inherent `on_*` names are the builder setters; dispatch goes through `trigger_*`.
impl CircuitListener for Callbacks {
    fn on_open(&self, circuit: &str) {
        self.trigger_open(circuit);
    }

    fn on_half_open(&self, circuit: &str) {
        self.trigger_half_open(circuit);
    }

    fn on_closed(&self, circuit: &str) {
        self.trigger_closed(circuit);
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .field("on_closed", &self.on_closed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_unset_callbacks_are_noops() {
        let callbacks = Callbacks::new();
        callbacks.trigger_open("test");
        callbacks.trigger_half_open("test");
        callbacks.trigger_closed("test");
    }

    #[test]
    fn test_callbacks_receive_circuit_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (open, closed) = (seen.clone(), seen.clone());

        let callbacks = Callbacks::new()
            .on_open(move |name| open.lock().unwrap().push(format!("open:{}", name)))
            .on_closed(move |name| closed.lock().unwrap().push(format!("closed:{}", name)));

        callbacks.trigger_open("db");
        callbacks.trigger_half_open("db");
        callbacks.trigger_closed("db");

        assert_eq!(*seen.lock().unwrap(), vec!["open:db", "closed:db"]);
    }

    #[test]
    fn test_listener_trait_dispatches_to_closures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (open, half_open, closed) = (seen.clone(), seen.clone(), seen.clone());

        let callbacks = Callbacks::new()
            .on_open(move |name| open.lock().unwrap().push(format!("open:{}", name)))
            .on_half_open(move |name| half_open.lock().unwrap().push(format!("half_open:{}", name)))
            .on_closed(move |name| closed.lock().unwrap().push(format!("closed:{}", name)));

        CircuitListener::on_open(&callbacks, "api");
        CircuitListener::on_half_open(&callbacks, "api");

        let listener: &dyn CircuitListener = &callbacks;
        listener.on_closed("api");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["open:api", "half_open:api", "closed:api"]
        );
    }
}
