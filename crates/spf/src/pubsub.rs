//! Topic-keyed subscriber lists (spec.md §4.D).
//!
//! Used by `spf::resources` to deliver "script at id X finished loading"
//! notifications and by `spf::scripts` to deliver "names N are all ready".
//! The null-in-place removal and snapshot-iteration-with-abort-on-panic
//! contracts below exist so a subscriber can safely unsubscribe itself (or
//! another subscriber) from inside its own callback during `publish`.

use std::collections::HashMap;

/// A callback subscribed to a topic.
type Callback = Box<dyn FnMut()>;

/// A topic → ordered-subscriber-list table.
#[derive(Default)]
pub struct PubSub {
    topics: HashMap<String, Vec<Option<Callback>>>,
}

impl PubSub {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `callback` to `topic`, appending it to the end of that
    /// topic's list.
    pub fn subscribe(&mut self, topic: impl Into<String>, callback: impl FnMut() + 'static) {
        self.topics
            .entry(topic.into())
            .or_default()
            .push(Some(Box::new(callback)));
    }

    /// Removes the callback at the given subscription index, nulling it
    /// out in place rather than shifting the list — so an index captured
    /// before a concurrent unsubscribe stays valid and an in-progress
    /// [`PubSub::publish`] snapshot simply skips the hole.
    ///
    /// Returns `true` if a live subscriber occupied that slot.
    pub fn unsubscribe(&mut self, topic: &str, index: usize) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        let Some(slot) = subscribers.get_mut(index) else {
            return false;
        };
        slot.take().is_some()
    }

    /// Calls every live subscriber of `topic`, in subscription order, on a
    /// snapshot of the subscriber list taken at the start of the call.
    /// Entries unsubscribed during iteration (`None` holes, including ones
    /// created by a subscriber unsubscribing itself or a later one) are
    /// skipped.
    pub fn publish(&mut self, topic: &str) {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return;
        };
        for index in 0..subscribers.len() {
            let Some(subscribers) = self.topics.get_mut(topic) else {
                return;
            };
            let Some(Some(callback)) = subscribers.get_mut(index) else {
                continue;
            };
            callback();
        }
    }

    /// Removes every subscriber of `topic`, or every topic entirely when
    /// `topic` is `None`.
    pub fn clear(&mut self, topic: Option<&str>) {
        match topic {
            Some(topic) => {
                self.topics.remove(topic);
            }
            None => self.topics.clear(),
        }
    }

    /// Number of subscriber slots on `topic`, live or unsubscribed (0 if
    /// the topic doesn't exist).
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn publish_calls_subscribers_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pubsub = PubSub::new();
        for value in 0..3 {
            let log = Rc::clone(&log);
            pubsub.subscribe("t", move || log.borrow_mut().push(value));
        }
        pubsub.publish("t");
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_nulls_in_place_and_is_skipped_on_publish() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pubsub = PubSub::new();
        for value in 0..3 {
            let log = Rc::clone(&log);
            pubsub.subscribe("t", move || log.borrow_mut().push(value));
        }
        assert!(pubsub.unsubscribe("t", 1));
        pubsub.publish("t");
        assert_eq!(*log.borrow(), vec![0, 2]);
        assert_eq!(pubsub.subscriber_count("t"), 3);
    }

    #[test]
    fn unsubscribe_is_first_match_only_and_idempotent() {
        let mut pubsub = PubSub::new();
        pubsub.subscribe("t", || {});
        assert!(pubsub.unsubscribe("t", 0));
        assert!(!pubsub.unsubscribe("t", 0));
    }

    #[test]
    fn a_subscriber_can_unsubscribe_a_later_one_mid_publish() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pubsub = Rc::new(RefCell::new(PubSub::new()));

        {
            let pubsub_inner = Rc::clone(&pubsub);
            pubsub.borrow_mut().subscribe("t", move || {
                pubsub_inner.borrow_mut().unsubscribe("t", 1);
            });
        }
        {
            let log = Rc::clone(&log);
            pubsub.borrow_mut().subscribe("t", move || log.borrow_mut().push("should not run"));
        }
        {
            let log = Rc::clone(&log);
            pubsub.borrow_mut().subscribe("t", move || log.borrow_mut().push("third"));
        }

        pubsub.borrow_mut().publish("t");
        assert_eq!(*log.borrow(), vec!["third"]);
    }

    #[test]
    fn clear_one_topic_leaves_others_intact() {
        let mut pubsub = PubSub::new();
        pubsub.subscribe("a", || {});
        pubsub.subscribe("b", || {});
        pubsub.clear(Some("a"));
        assert_eq!(pubsub.subscriber_count("a"), 0);
        assert_eq!(pubsub.subscriber_count("b"), 1);
    }

    #[test]
    fn clear_all_removes_every_topic() {
        let mut pubsub = PubSub::new();
        pubsub.subscribe("a", || {});
        pubsub.subscribe("b", || {});
        pubsub.clear(None);
        assert_eq!(pubsub.subscriber_count("a"), 0);
        assert_eq!(pubsub.subscriber_count("b"), 0);
    }
}
