//! Observable counters
//!
//! Latest known value plus change subscribers.

use std::fmt;

use crate::bitmap::SubscriptionId;

type Callback<T> = Box<dyn FnMut(T) + Send>;

/// A value that notifies subscribers when it changes
pub struct Observable<T> {
    value: T,
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
    next_subscription_id: SubscriptionId,
}

impl<T: Copy + PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            subscribers: Vec::new(),
            next_subscription_id: 0,
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.value
    }

    /// Store a value; subscribers run only if it differs from the old one
    pub fn set(&mut self, value: T) {
        if self.value == value {
            return;
        }
        self.value = value;
        for (_, callback) in self.subscribers.iter_mut() {
            callback(value);
        }
    }

    pub fn subscribe(&mut self, callback: Callback<T>) -> SubscriptionId {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        self.subscribers.push((id, callback));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
