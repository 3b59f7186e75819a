//! Blocking channel shared between spawned units

use super::value::Value;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("send on closed channel")]
    Closed,
}

struct State {
    buf: VecDeque<(u64, Value)>,
    cap: usize,
    closed: bool,
    /// Tickets handed to senders, and how many values receivers have taken.
    pushed: u64,
    taken: u64,
}

/// Typed-at-the-language-level, optionally buffered queue.
///
/// With capacity 0 the channel is a rendezvous: `send` returns only once a
/// receiver has taken the value.
pub struct Channel {
    state: Mutex<State>,
    changed: Condvar,
}

impl Channel {
    pub fn new(cap: usize) -> Self {
        Channel {
            state: Mutex::new(State {
                buf: VecDeque::new(),
                cap,
                closed: false,
                pushed: 0,
                taken: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn send(&self, value: Value) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let limit = state.cap.max(1);
        while !state.closed && state.buf.len() >= limit {
            self.changed.wait(&mut state);
        }
        if state.closed {
            return Err(ChannelError::Closed);
        }
        let ticket = state.pushed;
        state.pushed += 1;
        state.buf.push_back((ticket, value));
        self.changed.notify_all();

        if state.cap > 0 {
            return Ok(());
        }
        while state.taken <= ticket {
            if state.closed {
                // Never picked up; withdraw it.
                if let Some(pos) = state.buf.iter().position(|(t, _)| *t == ticket) {
                    state.buf.remove(pos);
                    return Err(ChannelError::Closed);
                }
                return Ok(());
            }
            self.changed.wait(&mut state);
        }
        Ok(())
    }

    /// Next value, or `None` once the channel is closed and drained.
    pub fn receive(&self) -> Option<Value> {
        let mut state = self.state.lock();
        loop {
            if let Some((_, value)) = state.buf.pop_front() {
                state.taken += 1;
                self.changed.notify_all();
                return Some(value);
            }
            if state.closed {
                return None;
            }
            self.changed.wait(&mut state);
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Buffered values; always 0 for a rendezvous channel.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        if state.cap == 0 { 0 } else { state.buf.len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.state.lock().cap
    }
}
