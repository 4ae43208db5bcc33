//! Segmented packet buffers.
//!
//! A logical packet is a doubly linked chain of fixed-capacity segments. All
//! segments live in a [`SegmentPool`] created up front and are addressed by
//! [`SegmentId`]; nothing is allocated once the pool is populated.
//!
//! Every segment carries `length` (valid bytes in the segment) and
//! `tot_length` (valid bytes from this segment to the end of its chain). The
//! totals are only recomputed when the chain topology or a length changes,
//! never when the chain is read.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("segment pool exhausted ({capacity} segments)")]
    PoolExhausted { capacity: usize },
    #[error("segment length {length} exceeds its capacity of {capacity} bytes")]
    LengthExceedsCapacity { length: usize, capacity: usize },
    #[error("source and destination are the same segment")]
    SameSegment,
}

#[derive(Debug)]
struct Segment {
    data: Box<[u8]>,
    length: usize,
    tot_length: usize,
    prev: Option<SegmentId>,
    next: Option<SegmentId>,
}

/// Arena owning every segment of a link.
#[derive(Debug)]
pub struct SegmentPool {
    segments: Vec<Segment>,
    capacity: usize,
}

impl SegmentPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            segments: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Creates an unlinked segment over `backing`. Its length is the full
    /// backing size.
    pub fn create(&mut self, backing: impl Into<Box<[u8]>>) -> Result<SegmentId, ChainError> {
        if self.segments.len() >= self.capacity {
            return Err(ChainError::PoolExhausted {
                capacity: self.capacity,
            });
        }

        let data = backing.into();
        let length = data.len();
        self.segments.push(Segment {
            data,
            length,
            tot_length: length,
            prev: None,
            next: None,
        });

        Ok(SegmentId(self.segments.len() - 1))
    }

    /// Creates an unlinked, zero-filled segment of `capacity` bytes.
    pub fn create_zeroed(&mut self, capacity: usize) -> Result<SegmentId, ChainError> {
        self.create(vec![0u8; capacity])
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn length(&self, id: SegmentId) -> usize {
        self.segments[id.0].length
    }

    pub fn tot_length(&self, id: SegmentId) -> usize {
        self.segments[id.0].tot_length
    }

    pub fn capacity(&self, id: SegmentId) -> usize {
        self.segments[id.0].data.len()
    }

    pub fn next(&self, id: SegmentId) -> Option<SegmentId> {
        self.segments[id.0].next
    }

    pub fn prev(&self, id: SegmentId) -> Option<SegmentId> {
        self.segments[id.0].prev
    }

    /// Valid bytes of one segment.
    pub fn data(&self, id: SegmentId) -> &[u8] {
        let segment = &self.segments[id.0];
        &segment.data[..segment.length]
    }

    /// Valid bytes of one segment, writable.
    pub fn data_mut(&mut self, id: SegmentId) -> &mut [u8] {
        let segment = &mut self.segments[id.0];
        &mut segment.data[..segment.length]
    }

    /// The whole backing storage of one segment, regardless of its length.
    pub fn buffer(&self, id: SegmentId) -> &[u8] {
        &self.segments[id.0].data
    }

    pub fn buffer_mut(&mut self, id: SegmentId) -> &mut [u8] {
        &mut self.segments[id.0].data
    }

    /// Valid bytes of `src` together with the whole backing storage of `dest`.
    pub fn read_write(&mut self, src: SegmentId, dest: SegmentId) -> Result<(&[u8], &mut [u8]), ChainError> {
        if src == dest {
            return Err(ChainError::SameSegment);
        }

        let (src_segment, dest_segment) = if src.0 < dest.0 {
            let (low, high) = self.segments.split_at_mut(dest.0);
            (&low[src.0], &mut high[0])
        } else {
            let (low, high) = self.segments.split_at_mut(src.0);
            (&high[0], &mut low[dest.0])
        };

        Ok((
            &src_segment.data[..src_segment.length],
            &mut dest_segment.data[..],
        ))
    }

    /// Sets the number of valid bytes in a segment and refreshes the totals of
    /// its chain.
    pub fn set_length(&mut self, id: SegmentId, length: usize) -> Result<(), ChainError> {
        let capacity = self.capacity(id);
        if length > capacity {
            return Err(ChainError::LengthExceedsCapacity { length, capacity });
        }

        self.segments[id.0].length = length;
        self.adjust_lengths(id);
        Ok(())
    }

    pub fn head(&self, id: SegmentId) -> SegmentId {
        let mut head = id;
        while let Some(prev) = self.prev(head) {
            head = prev;
        }
        head
    }

    pub fn tail(&self, id: SegmentId) -> SegmentId {
        let mut tail = id;
        while let Some(next) = self.next(tail) {
            tail = next;
        }
        tail
    }

    /// Appends `new_chain` after the last segment of `chain`.
    pub fn insert_at_end(&mut self, chain: SegmentId, new_chain: SegmentId) {
        let chain_end = self.tail(chain);

        self.segments[chain_end.0].next = Some(new_chain);
        self.segments[new_chain.0].prev = Some(chain_end);

        self.adjust_lengths(chain);
    }

    /// Prepends `new_chain` before the first segment of `chain`.
    pub fn insert_at_start(&mut self, chain: SegmentId, new_chain: SegmentId) {
        let chain_head = self.head(chain);
        let new_chain_end = self.tail(new_chain);

        self.segments[new_chain_end.0].next = Some(chain_head);
        self.segments[chain_head.0].prev = Some(new_chain_end);

        self.adjust_lengths(chain);
    }

    pub fn insert_before(&mut self, current: SegmentId, new_chain: SegmentId) {
        match self.prev(current) {
            None => self.insert_at_start(current, new_chain),
            Some(prev) => self.insert_after(prev, new_chain),
        }
    }

    pub fn insert_after(&mut self, current: SegmentId, new_chain: SegmentId) {
        let Some(next) = self.next(current) else {
            self.insert_at_end(current, new_chain);
            return;
        };

        let new_chain_end = self.tail(new_chain);

        self.segments[new_chain_end.0].next = Some(next);
        self.segments[new_chain.0].prev = Some(current);
        self.segments[next.0].prev = Some(new_chain_end);
        self.segments[current.0].next = Some(new_chain);

        self.adjust_lengths(current);
    }

    /// Unlinks a single segment from its chain, closing the gap it leaves.
    pub fn detach(&mut self, id: SegmentId) {
        let prev = self.segments[id.0].prev.take();
        let next = self.segments[id.0].next.take();

        if let Some(prev) = prev {
            self.segments[prev.0].next = next;
        }
        if let Some(next) = next {
            self.segments[next.0].prev = prev;
        }

        if let Some(neighbour) = prev.or(next) {
            self.adjust_lengths(neighbour);
        }
        self.adjust_lengths(id);
    }

    /// Recomputes `tot_length` from the tail of the chain back to its head.
    fn adjust_lengths(&mut self, chain: SegmentId) {
        let mut position = Some(self.tail(chain));

        while let Some(id) = position {
            let below = self.segments[id.0]
                .next
                .map_or(0, |next| self.segments[next.0].tot_length);
            let segment = &mut self.segments[id.0];
            segment.tot_length = segment.length + below;
            position = segment.prev;
        }
    }

    /// Copies up to `length` bytes from `src` (starting `src_offset` bytes into
    /// the chain) into `dest` (starting `dest_offset` bytes into the chain).
    ///
    /// The count is clamped to what both chains hold past their offsets. An
    /// offset at or past the chain's `tot_length` turns the call into a no-op.
    /// Returns the number of bytes copied.
    pub fn copy_partial(
        &mut self,
        dest: SegmentId,
        dest_offset: usize,
        src: SegmentId,
        src_offset: usize,
        length: usize,
    ) -> usize {
        if dest_offset >= self.tot_length(dest) || src_offset >= self.tot_length(src) {
            return 0;
        }

        let length = length
            .min(self.tot_length(dest) - dest_offset)
            .min(self.tot_length(src) - src_offset);

        let (mut dest, mut dest_offset) = self.seek(dest, dest_offset);
        let (mut src, mut src_offset) = self.seek(src, src_offset);

        let mut copied = 0;
        while copied < length {
            let (Some(d), Some(s)) = (dest, src) else {
                break;
            };

            let byte = self.segments[s.0].data[src_offset];
            self.segments[d.0].data[dest_offset] = byte;
            copied += 1;

            dest_offset += 1;
            if dest_offset >= self.segments[d.0].length {
                (dest, dest_offset) = self.seek_from(self.segments[d.0].next, 0);
            }
            src_offset += 1;
            if src_offset >= self.segments[s.0].length {
                (src, src_offset) = self.seek_from(self.segments[s.0].next, 0);
            }
        }

        copied
    }

    /// Same as [`copy_partial`](Self::copy_partial) from the start of both chains.
    pub fn copy(&mut self, dest: SegmentId, src: SegmentId, length: usize) -> usize {
        self.copy_partial(dest, 0, src, 0, length)
    }

    fn seek(&self, chain: SegmentId, offset: usize) -> (Option<SegmentId>, usize) {
        self.seek_from(Some(chain), offset)
    }

    // Skips whole segments (including empty ones) until `offset` lands inside one.
    fn seek_from(&self, mut position: Option<SegmentId>, mut offset: usize) -> (Option<SegmentId>, usize) {
        while let Some(id) = position {
            let length = self.segments[id.0].length;
            if offset < length {
                break;
            }
            offset -= length;
            position = self.segments[id.0].next;
        }
        (position, offset)
    }

    /// Segments of the chain starting at `chain`.
    pub fn segments(&self, chain: SegmentId) -> impl Iterator<Item = SegmentId> + '_ {
        std::iter::successors(Some(chain), move |&id| self.next(id))
    }

    /// Valid bytes of the chain starting at `chain`, in order.
    pub fn bytes(&self, chain: SegmentId) -> impl Iterator<Item = u8> + '_ {
        self.segments(chain)
            .flat_map(move |id| self.data(id).iter().copied())
    }

    /// Flattens the chain starting at `chain` into a vector.
    pub fn to_vec(&self, chain: SegmentId) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.tot_length(chain));
        out.extend(self.bytes(chain));
        out
    }
}
