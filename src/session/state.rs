/// Lifecycle state of one client-to-upstream paired session.
///
/// `Pending` until the upstream handshake completes, `Open` while both
/// transports relay, `Closing` once either side requests teardown, and
/// `Closed` as the terminal state. No transitions are legal out of
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (Self::Closed, _) => false,
            (_, Self::Pending) => false,
            (Self::Pending, Self::Open) => true,
            (Self::Pending, Self::Closing) | (Self::Pending, Self::Closed) => true,
            (Self::Open, Self::Closing) | (Self::Open, Self::Closed) => true,
            (Self::Closing, Self::Closed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}
