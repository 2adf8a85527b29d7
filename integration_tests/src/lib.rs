//! Shared helpers for the railcan integration tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use railcan_common::{
    devices::EnrolledLoco,
    messages::CanFrame,
    traits::{CanReceiver, CanSendError, CanSender, LocoStore},
};

#[derive(Default)]
struct RecorderState {
    frames: Vec<CanFrame>,
    fail: bool,
}

/// A [`CanSender`] that records every transmitted frame
///
/// Clones share the same log, so a handle kept by the test observes frames sent by the
/// station. `set_fail` switches the sender into rejecting transmissions.
#[derive(Clone, Default)]
pub struct RecordingSender {
    state: Rc<RefCell<RecorderState>>,
}

impl RecordingSender {
    /// A fresh sender with an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// All frames sent so far, oldest first
    pub fn sent(&self) -> Vec<CanFrame> {
        self.state.borrow().frames.clone()
    }

    /// The most recently sent frame
    pub fn last(&self) -> Option<CanFrame> {
        self.state.borrow().frames.last().copied()
    }

    /// Forget all recorded frames
    pub fn clear(&self) {
        self.state.borrow_mut().frames.clear();
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_fail(&self, fail: bool) {
        self.state.borrow_mut().fail = fail;
    }
}

impl CanSender for RecordingSender {
    fn send(&mut self, frame: CanFrame) -> Result<(), CanSendError> {
        let mut state = self.state.borrow_mut();
        if state.fail {
            return Err(CanSendError(frame));
        }
        state.frames.push(frame);
        Ok(())
    }
}

/// A [`CanReceiver`] fed from a queue of pre-staged frames
#[derive(Default)]
pub struct QueueReceiver {
    frames: VecDeque<CanFrame>,
}

impl QueueReceiver {
    /// An empty receiver
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a frame for the next poll
    pub fn push(&mut self, frame: CanFrame) {
        self.frames.push_back(frame);
    }
}

impl CanReceiver for QueueReceiver {
    fn try_recv(&mut self) -> Option<CanFrame> {
        self.frames.pop_front()
    }
}

/// An in-memory [`LocoStore`] following the registry's append-only index rules
#[derive(Debug, Default)]
pub struct MemLocoStore {
    locos: Vec<EnrolledLoco>,
}

impl MemLocoStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocoStore for MemLocoStore {
    fn count(&self) -> u8 {
        self.locos.len() as u8
    }

    fn load(&self, index: u8) -> Option<EnrolledLoco> {
        if index == 0 {
            return None;
        }
        self.locos.get(index as usize - 1).copied()
    }

    fn save(&mut self, mut loco: EnrolledLoco) -> EnrolledLoco {
        match loco.storage_index {
            Some(index) if index >= 1 && (index as usize) <= self.locos.len() => {
                self.locos[index as usize - 1] = loco;
            }
            _ => {
                loco.storage_index = Some(self.locos.len() as u8 + 1);
                self.locos.push(loco);
            }
        }
        loco
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store_index_rules() {
        let mut store = MemLocoStore::new();
        assert_eq!(store.count(), 0);
        assert_eq!(store.allocate_next_address(), 1);
        assert!(store.load(1).is_none());

        let saved = store.save(EnrolledLoco::new(0x11223344, 1));
        assert_eq!(saved.storage_index, Some(1));
        assert_eq!(store.count(), 1);
        assert_eq!(store.allocate_next_address(), 2);
        assert_eq!(store.load(1), Some(saved));

        // Saving with a valid index overwrites in place
        let updated = store.save(EnrolledLoco {
            identity: 0x55667788,
            local_address: 1,
            storage_index: Some(1),
        });
        assert_eq!(store.count(), 1);
        assert_eq!(store.load(1), Some(updated));

        // An out-of-range index is reassigned
        let appended = store.save(EnrolledLoco {
            identity: 0x99AABBCC,
            local_address: 2,
            storage_index: Some(9),
        });
        assert_eq!(appended.storage_index, Some(2));
        assert_eq!(store.count(), 2);
    }
}
