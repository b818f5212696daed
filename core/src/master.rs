//! The master arbiter: exactly one client may hold write/input authority
//! at a time (§4.8). `{None, Held(client_id)}` is the entire state space;
//! transitions are driven by explicit `request_master` messages and by
//! disconnection of the current holder.

use std::sync::Mutex;

pub type ClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    None,
    Held(ClientId),
}

/// What a caller should broadcast after a transition, or `None` if the
/// request was a no-op (e.g. the current master re-requesting).
pub struct Transition {
    pub new_master: Option<ClientId>,
}

pub struct MasterArbiter {
    state: Mutex<MasterState>,
}

impl MasterArbiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MasterState::None),
        }
    }

    pub fn current(&self) -> MasterState {
        *self.state.lock().unwrap()
    }

    /// A client asks to become master. Grants immediately if the seat is
    /// empty or already held by the requester; otherwise the request is a
    /// no-op (§4.8: the existing holder is not preempted by a bare request
    /// — a client must explicitly release or disconnect first).
    pub fn request(&self, client_id: ClientId) -> Option<Transition> {
        let mut state = self.state.lock().unwrap();
        match *state {
            MasterState::Held(current) if current == client_id => None,
            MasterState::Held(_) => None,
            MasterState::None => {
                *state = MasterState::Held(client_id);
                Some(Transition {
                    new_master: Some(client_id),
                })
            }
        }
    }

    /// The current master disconnects or explicitly releases. Always
    /// transitions to `None` — the next `request` will grant the seat
    /// (§4.8: no automatic handoff to a waiting client; clients re-request).
    pub fn release(&self, client_id: ClientId) -> Option<Transition> {
        let mut state = self.state.lock().unwrap();
        match *state {
            MasterState::Held(current) if current == client_id => {
                *state = MasterState::None;
                Some(Transition { new_master: None })
            }
            _ => None,
        }
    }

    pub fn is_master(&self, client_id: ClientId) -> bool {
        matches!(*self.state.lock().unwrap(), MasterState::Held(c) if c == client_id)
    }
}

impl Default for MasterArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_requester_becomes_master() {
        let arbiter = MasterArbiter::new();
        let t = arbiter.request(1).unwrap();
        assert_eq!(t.new_master, Some(1));
        assert!(arbiter.is_master(1));
    }

    #[test]
    fn second_requester_is_rejected_while_held() {
        let arbiter = MasterArbiter::new();
        arbiter.request(1).unwrap();
        assert!(arbiter.request(2).is_none());
        assert!(arbiter.is_master(1));
    }

    #[test]
    fn release_frees_the_seat_for_the_next_requester() {
        let arbiter = MasterArbiter::new();
        arbiter.request(1).unwrap();
        let t = arbiter.release(1).unwrap();
        assert_eq!(t.new_master, None);
        let t2 = arbiter.request(2).unwrap();
        assert_eq!(t2.new_master, Some(2));
    }

    #[test]
    fn release_by_non_master_is_a_no_op() {
        let arbiter = MasterArbiter::new();
        arbiter.request(1).unwrap();
        assert!(arbiter.release(2).is_none());
        assert!(arbiter.is_master(1));
    }
}
