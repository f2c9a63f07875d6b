//! Index bookkeeping for sequential decoders.
//!
//! A sequential decoder only moves forward, and a damaged packet can drop
//! frames without the decoder noticing. Every decoded frame therefore carries
//! its own stream position (derived from its timestamp), and the cursor
//! matches requested indices against those positions instead of counting
//! frames.

#![cfg_attr(not(feature = "ingest-ffmpeg"), allow(dead_code))]

/// Outcome of looking up one frame index.
#[derive(Debug, PartialEq)]
pub(crate) enum Lookup<F> {
    Found(F),
    /// The stream has no frame at the requested index; `next` is the position
    /// of the next frame it does have.
    Missing { next: u64 },
    EndOfStream,
}

pub(crate) struct FrameCursor<F> {
    /// Every position below this has been consumed or skipped.
    next_index: u64,
    /// Decoded frame past the last request, kept for a later one.
    pending: Option<(u64, F)>,
}

impl<F> Default for FrameCursor<F> {
    fn default() -> Self {
        Self {
            next_index: 0,
            pending: None,
        }
    }
}

impl<F> FrameCursor<F> {
    /// True when `index` is behind the cursor and the stream must restart.
    pub(crate) fn needs_rewind(&self, index: u64) -> bool {
        index < self.next_index
    }

    pub(crate) fn reset(&mut self) {
        self.next_index = 0;
        self.pending = None;
    }

    /// Advance to `index`, pulling `(position, frame)` pairs from `pull` until
    /// the requested position is reached or passed.
    pub(crate) fn seek<E>(
        &mut self,
        index: u64,
        mut pull: impl FnMut() -> Result<Option<(u64, F)>, E>,
    ) -> Result<Lookup<F>, E> {
        loop {
            let (position, frame) = match self.pending.take() {
                Some(entry) => entry,
                None => match pull()? {
                    Some(entry) => entry,
                    None => return Ok(Lookup::EndOfStream),
                },
            };
            if position < index {
                self.next_index = position + 1;
                continue;
            }
            if position > index {
                self.pending = Some((position, frame));
                self.next_index = index + 1;
                return Ok(Lookup::Missing { next: position });
            }
            self.next_index = position + 1;
            return Ok(Lookup::Found(frame));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stream whose frames carry their position as content.
    struct Stream {
        positions: Vec<u64>,
        at: usize,
    }

    impl Stream {
        fn new(positions: &[u64]) -> Self {
            Self {
                positions: positions.to_vec(),
                at: 0,
            }
        }

        fn pull(&mut self) -> Result<Option<(u64, u64)>, ()> {
            let next = self.positions.get(self.at).map(|&p| (p, p));
            self.at += 1;
            Ok(next)
        }

        fn read(&mut self, cursor: &mut FrameCursor<u64>, index: u64) -> Lookup<u64> {
            if cursor.needs_rewind(index) {
                cursor.reset();
                self.at = 0;
            }
            cursor.seek(index, || self.pull()).unwrap()
        }
    }

    #[test]
    fn dropped_frame_does_not_shift_later_indices() {
        // Frame 3 was lost with a damaged packet.
        let mut stream = Stream::new(&[0, 1, 2, 4, 5, 6]);
        let mut cursor = FrameCursor::default();
        assert_eq!(stream.read(&mut cursor, 0), Lookup::Found(0));
        assert_eq!(stream.read(&mut cursor, 3), Lookup::Missing { next: 4 });
        assert_eq!(stream.read(&mut cursor, 4), Lookup::Found(4));
        assert_eq!(stream.read(&mut cursor, 6), Lookup::Found(6));
        assert_eq!(stream.read(&mut cursor, 7), Lookup::EndOfStream);
    }

    #[test]
    fn several_requests_inside_a_gap_all_miss() {
        let mut stream = Stream::new(&[0, 5, 6]);
        let mut cursor = FrameCursor::default();
        assert_eq!(stream.read(&mut cursor, 1), Lookup::Missing { next: 5 });
        assert_eq!(stream.read(&mut cursor, 3), Lookup::Missing { next: 5 });
        assert_eq!(stream.read(&mut cursor, 5), Lookup::Found(5));
    }

    #[test]
    fn backwards_request_rewinds() {
        let mut stream = Stream::new(&[0, 1, 2, 3]);
        let mut cursor = FrameCursor::default();
        assert_eq!(stream.read(&mut cursor, 2), Lookup::Found(2));
        assert!(cursor.needs_rewind(1));
        assert_eq!(stream.read(&mut cursor, 1), Lookup::Found(1));
        assert_eq!(stream.read(&mut cursor, 3), Lookup::Found(3));
    }
}
