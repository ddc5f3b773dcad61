//! Bounded log of relayed messages, served to the chat viewer.
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::handle::BroadcastMessage;

#[derive(Debug)]
pub struct MessageHistory {
    capacity: usize,
    messages: Mutex<VecDeque<BroadcastMessage>>,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a message, evicting the oldest once full
    pub fn remember(&self, message: &BroadcastMessage) {
        if self.capacity == 0 {
            return;
        }
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        while messages.len() >= self.capacity {
            messages.pop_front();
        }
        messages.push_back(message.clone());
    }

    /// Oldest first
    pub fn recent(&self) -> Vec<BroadcastMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
