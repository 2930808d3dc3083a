//! Fans one chat registration out to many observers.

use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use chatscout_core::message::Message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

/// Delivers each message to every child in order. A failing or panicking
/// child is logged and skipped; the others still receive the message.
#[derive(Default)]
pub struct CompositeObserver {
    children: Vec<Arc<dyn ChatObserver>>,
}

impl CompositeObserver {
    pub fn new(children: Vec<Arc<dyn ChatObserver>>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, child: Arc<dyn ChatObserver>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl ChatObserver for CompositeObserver {
    fn name(&self) -> &str {
        "composite"
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError> {
        for child in &self.children {
            match catch_unwind(AssertUnwindSafe(|| child.update(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(observer = child.name(), error = %e, "Observer failed"),
                Err(_) => error!(observer = child.name(), "Observer panicked"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ChatObserver for Recorder {
        fn update(&self, message: &Message) -> Result<(), ObserverError> {
            self.seen.lock().unwrap().push(message.content().to_string());
            Ok(())
        }
    }

    struct Broken;

    impl ChatObserver for Broken {
        fn update(&self, _message: &Message) -> Result<(), ObserverError> {
            Err(ObserverError::Io(std::io::Error::other("disk full")))
        }
    }

    struct Panicky;

    impl ChatObserver for Panicky {
        fn update(&self, _message: &Message) -> Result<(), ObserverError> {
            panic!("observer bug")
        }
    }

    #[test]
    fn failures_do_not_stop_delivery() {
        let first = Arc::new(Recorder::default());
        let last = Arc::new(Recorder::default());
        let composite = CompositeObserver::new(vec![
            first.clone(),
            Arc::new(Broken),
            Arc::new(Panicky),
            last.clone(),
        ]);

        composite.update(&Message::user("one")).unwrap();
        composite.update(&Message::user("two")).unwrap();

        assert_eq!(*first.seen.lock().unwrap(), vec!["one", "two"]);
        assert_eq!(*last.seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn push_adds_children() {
        let mut composite = CompositeObserver::default();
        assert!(composite.is_empty());
        composite.push(Arc::new(Recorder::default()));
        assert_eq!(composite.len(), 1);
    }
}
