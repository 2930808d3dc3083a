//! The chat log: an append-only message sequence with observers.
//!
//! Observers are held weakly: registering one never extends its lifetime,
//! and an observer dropped by its owner simply stops receiving messages.

use std::io::{Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use tracing::error;

use crate::error::{ChatError, ObserverError};
use crate::message::Message;

/// A consumer notified of every message appended to a [`Chat`].
///
/// `update` runs synchronously on the appending flow, so a slow observer
/// slows `append` down.
pub trait ChatObserver: Send + Sync {
    /// Name used when reporting a failing observer.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError>;
}

/// An ordered conversation log.
#[derive(Default)]
pub struct Chat {
    messages: Vec<Message>,
    observers: Vec<Weak<dyn ChatObserver>>,
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("messages", &self.messages)
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

fn same_observer(a: &Weak<dyn ChatObserver>, b: &Arc<dyn ChatObserver>) -> bool {
    std::ptr::addr_eq(a.as_ptr(), Arc::as_ptr(b))
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chat seeded with the given messages.
    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut chat = Self::new();
        chat.extend(messages);
        chat
    }

    /// Append one message and notify every live observer.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        if let Some(last) = self.messages.last() {
            notify(&mut self.observers, last);
        }
    }

    /// Append several messages in order; each is delivered before the next is added.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.append(message);
        }
    }

    /// Register an observer. Returns `false` if it is already registered.
    pub fn add_observer(&mut self, observer: &Arc<dyn ChatObserver>) -> bool {
        self.observers.retain(|o| o.strong_count() > 0);
        if self.observers.iter().any(|o| same_observer(o, observer)) {
            return false;
        }
        self.observers.push(Arc::downgrade(observer));
        true
    }

    /// Unregister an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&mut self, observer: &Arc<dyn ChatObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !same_observer(o, observer));
        self.observers.len() != before
    }

    /// Number of observers that are still alive.
    pub fn observer_count(&self) -> usize {
        self.observers.iter().filter(|o| o.strong_count() > 0).count()
    }

    /// A copy of the current message sequence.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Encode the log as a JSON array of role-tagged records.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.messages)
    }

    /// Decode a log produced by [`Chat::serialize`].
    ///
    /// Every record's role is checked before decoding; an unknown role is an
    /// error, never a default.
    pub fn deserialize(data: &[u8]) -> Result<Self, ChatError> {
        let records: Vec<serde_json::Value> =
            serde_json::from_slice(data).map_err(|e| ChatError::Malformed {
                index: 0,
                reason: e.to_string(),
            })?;

        let mut messages = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let message = Message::try_from(record).map_err(|e| match e {
                ChatError::Malformed { reason, .. } => ChatError::Malformed { index, reason },
                other => other,
            })?;
            messages.push(message);
        }
        Ok(Self::with_messages(messages))
    }

    pub fn save(&self, mut writer: impl Write) -> Result<(), ChatError> {
        let bytes = self.serialize().map_err(|e| ChatError::Malformed {
            index: 0,
            reason: e.to_string(),
        })?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(mut reader: impl Read) -> Result<Self, ChatError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::deserialize(&buf)
    }
}

/// Deliver `message` to each live observer, isolating failures and panics.
fn notify(observers: &mut Vec<Weak<dyn ChatObserver>>, message: &Message) {
    observers.retain(|o| o.strong_count() > 0);
    for weak in observers.iter() {
        let Some(observer) = weak.upgrade() else {
            continue;
        };
        match catch_unwind(AssertUnwindSafe(|| observer.update(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(observer = observer.name(), error = %e, "Chat observer failed");
            }
            Err(_) => {
                error!(observer = observer.name(), "Chat observer panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, ToolCallRequest};
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

    struct Failing;

    impl ChatObserver for Failing {
        fn update(&self, _message: &Message) -> Result<(), ObserverError> {
            Err(ObserverError::Poisoned("always".into()))
        }
    }

    struct Panicking;

    impl ChatObserver for Panicking {
        fn update(&self, _message: &Message) -> Result<(), ObserverError> {
            panic!("observer blew up");
        }
    }

    fn recorder() -> (Arc<Recorder>, Arc<dyn ChatObserver>) {
        let rec = Arc::new(Recorder::default());
        let dyn_rec: Arc<dyn ChatObserver> = rec.clone();
        (rec, dyn_rec)
    }

    #[test]
    fn every_observer_sees_every_message_in_order() {
        let (rec_a, obs_a) = recorder();
        let (rec_b, obs_b) = recorder();
        let mut chat = Chat::new();
        assert!(chat.add_observer(&obs_a));
        assert!(chat.add_observer(&obs_b));

        chat.append(Message::user("one"));
        chat.extend([Message::assistant("two"), Message::user("three")]);

        for rec in [&rec_a, &rec_b] {
            assert_eq!(*rec.seen.lock().unwrap(), vec!["one", "two", "three"]);
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (rec, obs) = recorder();
        let mut chat = Chat::new();
        assert!(chat.add_observer(&obs));
        assert!(!chat.add_observer(&obs));

        chat.append(Message::user("once"));
        assert_eq!(rec.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn remove_unregistered_returns_false() {
        let (_rec, obs) = recorder();
        let mut chat = Chat::new();
        assert!(!chat.remove_observer(&obs));
        assert!(chat.add_observer(&obs));
        assert!(chat.remove_observer(&obs));
        assert!(!chat.remove_observer(&obs));
    }

    #[test]
    fn removed_observer_stops_receiving() {
        let (rec, obs) = recorder();
        let mut chat = Chat::new();
        chat.add_observer(&obs);
        chat.append(Message::user("before"));
        chat.remove_observer(&obs);
        chat.append(Message::user("after"));
        assert_eq!(*rec.seen.lock().unwrap(), vec!["before"]);
    }

    #[test]
    fn failing_and_panicking_observers_are_isolated() {
        let failing: Arc<dyn ChatObserver> = Arc::new(Failing);
        let panicking: Arc<dyn ChatObserver> = Arc::new(Panicking);
        let (rec, obs) = recorder();

        let mut chat = Chat::new();
        chat.add_observer(&failing);
        chat.add_observer(&panicking);
        chat.add_observer(&obs);

        chat.append(Message::user("still delivered"));
        assert_eq!(chat.len(), 1);
        assert_eq!(*rec.seen.lock().unwrap(), vec!["still delivered"]);
    }

    #[test]
    fn dropped_observer_is_not_kept_alive() {
        let (rec, obs) = recorder();
        let mut chat = Chat::new();
        chat.add_observer(&obs);
        drop(obs);
        drop(rec);

        assert_eq!(chat.observer_count(), 0);
        chat.append(Message::user("nobody listens"));
        assert_eq!(chat.len(), 1);
    }

    #[test]
    fn messages_returns_a_copy() {
        let mut chat = Chat::with_messages([Message::system("sys")]);
        let mut copy = chat.messages();
        copy.push(Message::user("sneaky"));
        assert_eq!(chat.len(), 1);

        chat.append(Message::user("real"));
        assert_eq!(chat.len(), 2);
    }

    #[test]
    fn serialization_roundtrip_preserves_roles_and_fields() {
        let chat = Chat::with_messages([
            Message::system("You are helpful"),
            Message::user("Find acetone"),
            Message::assistant_with_tools(
                None,
                vec![
                    ToolCallRequest::new("tc1", "search", r#"{"name":"acetone"}"#),
                    ToolCallRequest::new("tc2", "price", "{}"),
                ],
            ),
            Message::tool_result("tc1", "[{\"id\":3}]"),
            Message::tool_result("tc2", "12.50"),
            Message::assistant("Found one product."),
        ]);

        let bytes = chat.serialize().unwrap();
        let restored = Chat::deserialize(&bytes).unwrap();

        let roles: Vec<Role> = restored.iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Tool,
                Role::Assistant
            ]
        );
        assert_eq!(restored.messages(), chat.messages());
    }

    #[test]
    fn deserialize_rejects_unknown_role() {
        let data = br#"[{"role":"user","content":"hi"},{"role":"narrator","content":"x"}]"#;
        let err = Chat::deserialize(data).unwrap_err();
        assert!(matches!(err, ChatError::InvalidRole(ref r) if r == "narrator"));
    }

    #[test]
    fn deserialize_reports_malformed_index() {
        let data = br#"[{"role":"user","content":"hi"},{"role":"tool","content":"no id"}]"#;
        let err = Chat::deserialize(data).unwrap_err();
        assert!(matches!(err, ChatError::Malformed { index: 1, .. }));
    }

    #[test]
    fn save_and_load_through_io() {
        let chat = Chat::with_messages([Message::user("persist me")]);
        let mut buf = Vec::new();
        chat.save(&mut buf).unwrap();
        let loaded = Chat::load(buf.as_slice()).unwrap();
        assert_eq!(loaded.messages(), chat.messages());
    }
}
