//! Scripted transport
//!
//! Replays queued replies and records every request. Stands in for the
//! instrument in tests and dry runs.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::TransportError;

use super::Transport;

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Bytes),
    Timeout,
    Closed,
}

/// Transport that answers from a queue
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Scripted>,
    requests: Vec<Bytes>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply frame
    pub fn push_reply(&mut self, frame: impl Into<Bytes>) -> &mut Self {
        self.script.push_back(Scripted::Reply(frame.into()));
        self
    }

    /// Queue a timeout
    pub fn push_timeout(&mut self) -> &mut Self {
        self.script.push_back(Scripted::Timeout);
        self
    }

    /// Queue a closed link
    pub fn push_closed(&mut self) -> &mut Self {
        self.script.push_back(Scripted::Closed);
        self
    }

    /// Requests sent so far, oldest first
    pub fn requests(&self) -> &[Bytes] {
        &self.requests
    }

    /// Number of queued entries not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Transport for ScriptedTransport {
    fn send_receive(&mut self, request: &[u8], expected_len: usize) -> Result<Bytes, TransportError> {
        self.requests.push(Bytes::copy_from_slice(request));
        tracing::trace!(?request, expected_len, "Scripted exchange");

        // An exhausted script behaves like a silent instrument
        match self.script.pop_front() {
            Some(Scripted::Reply(frame)) => Ok(frame),
            Some(Scripted::Timeout) | None => Err(TransportError::Timeout),
            Some(Scripted::Closed) => Err(TransportError::Closed),
        }
    }
}
