//! Change notifications for status-reporting collaborators

use std::fmt;
use std::rc::Rc;

/// Receiver of session change notifications
///
/// All methods have empty defaults so listeners only implement what they
/// display. Notifications are delivered synchronously on the editing thread.
pub trait EditListener {
    /// The history cursor moved or the sync point changed
    fn position_changed(&self, _position: usize) {}

    /// A command was executed or recorded
    fn command_added(&self, _caption: &str) {}

    /// The document was mutated or replaced; `size` is the new size
    fn size_changed(&self, _size: u64) {}
}

/// Registered listeners, notified in registration order
#[derive(Clone, Default)]
pub struct Listeners {
    listeners: Vec<Rc<dyn EditListener>>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

impl Listeners {
    pub fn add(&mut self, listener: Rc<dyn EditListener>) {
        self.listeners.push(listener);
    }

    /// Remove a listener previously passed to [`Self::add`]
    pub fn remove(&mut self, listener: &Rc<dyn EditListener>) {
        self.listeners
            .retain(|l| !std::ptr::addr_eq(Rc::as_ptr(l), Rc::as_ptr(listener)));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn position_changed(&self, position: usize) {
        for listener in &self.listeners {
            listener.position_changed(position);
        }
    }

    pub fn command_added(&self, caption: &str) {
        for listener in &self.listeners {
            listener.command_added(caption);
        }
    }

    pub fn size_changed(&self, size: u64) {
        for listener in &self.listeners {
            listener.size_changed(size);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingListener;
    use super::*;

    #[test]
    fn test_notifies_all_listeners() {
        let first = Rc::new(RecordingListener::default());
        let second = Rc::new(RecordingListener::default());
        let mut listeners = Listeners::default();
        listeners.add(first.clone());
        listeners.add(second.clone());

        listeners.size_changed(42);

        assert_eq!(first.sizes.get(), 1);
        assert_eq!(second.last_size.get(), Some(42));
    }

    #[test]
    fn test_remove_listener() {
        let recorder = Rc::new(RecordingListener::default());
        let handle: Rc<dyn EditListener> = recorder.clone();
        let mut listeners = Listeners::default();
        listeners.add(handle.clone());

        listeners.remove(&handle);
        listeners.command_added("Insert data");

        assert!(listeners.is_empty());
        assert_eq!(recorder.commands.get(), 0);
    }
}
