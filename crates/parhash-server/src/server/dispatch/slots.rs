//! Order-preserving result aggregation for one `ParallelHash` call.

use bytes::Bytes;
use parhash_core::{Error, Result};

/// One slot per input buffer, filled in whatever order tasks complete.
///
/// Each task returns its hash together with the index it owns, and only the
/// joining call writes into the slots, so the array is never shared and needs
/// no lock. A slot is written at most once; [`ResultSlots::into_hashes`] only
/// succeeds once every slot holds a hash.
#[derive(Debug)]
pub struct ResultSlots {
    slots: Vec<Option<Bytes>>,
}

impl ResultSlots {
    /// Preallocates `len` empty slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Stores `hash` as the result of buffer `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if `index` is out of range or was already
    /// filled; either means two tasks claimed the same buffer.
    pub fn fill(&mut self, index: usize, hash: Bytes) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| Error::Internal {
            context: format!("result index {index} out of range for {len} buffers"),
        })?;
        if slot.is_some() {
            return Err(Error::Internal {
                context: format!("result for buffer {index} written twice"),
            });
        }
        *slot = Some(hash);
        Ok(())
    }

    /// Consumes the slots and returns the hashes in input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] naming the first empty slot if the fan-out
    /// finished without producing every hash.
    pub fn into_hashes(self) -> Result<Vec<Bytes>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| Error::Internal {
                    context: format!("no result for buffer {index}"),
                })
            })
            .collect()
    }
}
