use std::fmt;

use tracing::trace;

/// Where a connection is in its request/response cycle.
///
/// ```text
/// AwaitingRequestLine -> ParsingHeaders -> StreamingBody -> AwaitingResponseStart
///     ^                                                            |
///     |                                                            v
///     +---------------- (keep-alive) ---------------------- StreamingResponse -> Closing
/// ```
///
/// Every state may move to `Aborted`; `Closing` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequestLine,
    ParsingHeaders,
    StreamingBody,
    AwaitingResponseStart,
    StreamingResponse,
    Closing,
    Aborted,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Aborted)
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closing | Aborted, _) => false,
            (_, Aborted) => true,
            (AwaitingRequestLine, ParsingHeaders | Closing) => true,
            (ParsingHeaders, StreamingBody) => true,
            (StreamingBody, AwaitingResponseStart | StreamingResponse) => true,
            (AwaitingResponseStart, StreamingResponse) => true,
            (StreamingResponse, AwaitingRequestLine | Closing) => true,
            _ => false,
        }
    }

    /// Moves to `next`, tracing the transition.
    ///
    /// An invalid transition is a bug in the connection loop and panics in debug builds.
    pub(crate) fn transition(&mut self, next: ConnectionState) {
        debug_assert!(self.can_transition_to(next), "invalid connection state transition: {self} -> {next}");
        trace!(from = %self, to = %next, "connection state transition");
        *self = next;
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingRequestLine => "awaiting_request_line",
            Self::ParsingHeaders => "parsing_headers",
            Self::StreamingBody => "streaming_body",
            Self::AwaitingResponseStart => "awaiting_response_start",
            Self::StreamingResponse => "streaming_response",
            Self::Closing => "closing",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn keep_alive_cycle() {
        let mut state = AwaitingRequestLine;
        for next in [ParsingHeaders, StreamingBody, AwaitingResponseStart, StreamingResponse, AwaitingRequestLine] {
            state.transition(next);
        }
        assert_eq!(state, AwaitingRequestLine);
    }

    #[test]
    fn terminal_states() {
        assert!(Closing.is_terminal());
        assert!(!Aborted.can_transition_to(AwaitingRequestLine));
        assert!(!Closing.can_transition_to(Aborted));
        assert!(StreamingBody.can_transition_to(Aborted));
    }

    #[test]
    fn no_shortcuts() {
        assert!(!AwaitingRequestLine.can_transition_to(StreamingResponse));
        assert!(!StreamingResponse.can_transition_to(ParsingHeaders));
        assert!(!ParsingHeaders.can_transition_to(Closing));
    }
}
