//! Sequence counter observation.
//!
//! The packet counter is a wrapping u16. It is only used to notice loss and
//! reordering; readings are delivered regardless of what it says.

/// How a sequence number relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqObservation {
    /// First packet seen.
    First,
    /// Exactly one after the previous packet.
    InOrder,
    /// Some packets were skipped.
    Gap { missing: u16 },
    /// Same counter as the previous packet.
    Duplicate,
    /// Counter went backwards.
    Reordered,
}

#[derive(Debug, Clone, Default)]
pub struct SeqTracker {
    last: Option<u16>,
}

impl SeqTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, seq: u16) -> SeqObservation {
        let Some(last) = self.last else {
            self.last = Some(seq);
            return SeqObservation::First;
        };

        let step = seq.wrapping_sub(last);

        match step {
            0 => SeqObservation::Duplicate,
            1 => {
                self.last = Some(seq);
                SeqObservation::InOrder
            }
            // a forward jump of less than half the counter space is loss
            s if s < 0x8000 => {
                self.last = Some(seq);
                SeqObservation::Gap { missing: s - 1 }
            }
            _ => SeqObservation::Reordered,
        }
    }
}
