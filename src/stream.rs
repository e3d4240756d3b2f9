use crate::{transport::ReadOutcome, Error};

/// Receive buffer size: the bulk max packet size at full speed.
pub const PACKET_SIZE: usize = 64;

/// Holds the payload of the most recent USB-MIDI packet until it has been
/// consumed.
///
/// Invariant: `start + remaining <= PACKET_SIZE`.
pub(crate) struct PacketBuffer {
    buf: [u8; PACKET_SIZE],
    start: usize,
    remaining: usize,
}

impl PacketBuffer {
    pub(crate) fn new() -> Self {
        PacketBuffer {
            buf: [0; PACKET_SIZE],
            start: 0,
            remaining: 0,
        }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Receive a new packet with `receive` if nothing is buffered.
    ///
    /// The first byte of every packet is the cable number / code index
    /// header and is dropped. A timeout leaves the buffer empty.
    pub(crate) fn refill_with(
        &mut self,
        receive: impl FnOnce(&mut [u8]) -> Result<ReadOutcome, Error>,
    ) -> Result<(), Error> {
        if !self.is_empty() {
            return Ok(());
        }

        match receive(&mut self.buf)? {
            ReadOutcome::Data(n) => {
                let n = n.min(PACKET_SIZE);
                self.start = 1;
                self.remaining = n.saturating_sub(1);
            }
            ReadOutcome::TimedOut => {}
        }
        Ok(())
    }

    /// The unconsumed payload bytes.
    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        &self.buf[self.start..self.start + self.remaining]
    }

    #[inline]
    pub(crate) fn consume(&mut self, len: usize) {
        assert!(len <= self.remaining, "consumed more than available");
        self.start += len;
        self.remaining -= len;
    }

    /// Take up to `size` bytes from the front of the buffer.
    pub(crate) fn take(&mut self, size: usize) -> &[u8] {
        let size = size.min(self.remaining);
        let start = self.start;
        self.consume(size);
        &self.buf[start..start + size]
    }
}

pub(crate) fn copy_min(dest: &mut [u8], src: &[u8]) -> usize {
    let len = dest.len().min(src.len());
    dest[..len].copy_from_slice(&src[..len]);
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(data: &'static [u8]) -> impl FnOnce(&mut [u8]) -> Result<ReadOutcome, Error> {
        move |buf: &mut [u8]| {
            buf[..data.len()].copy_from_slice(data);
            Ok(ReadOutcome::Data(data.len()))
        }
    }

    #[test]
    fn test_header_dropped() {
        let mut b = PacketBuffer::new();
        assert!(b.is_empty());
        b.refill_with(packet(&[0x09, 0x90, 0x3c, 0x64])).unwrap();
        assert_eq!(b.remaining(), 3);
        assert_eq!(b.data(), &[0x90, 0x3c, 0x64]);
    }

    #[test]
    fn test_take_in_pieces() {
        let mut b = PacketBuffer::new();
        b.refill_with(packet(&[0x09, 0x90, 0x3c, 0x64, 0x08, 0x80])).unwrap();
        assert_eq!(b.take(2), &[0x90, 0x3c]);
        assert_eq!(b.take(0), &[] as &[u8]);
        assert_eq!(b.take(10), &[0x64, 0x08, 0x80]);
        assert!(b.is_empty());
        assert_eq!(b.take(4), &[] as &[u8]);
    }

    #[test]
    fn test_no_refill_while_buffered() {
        let mut b = PacketBuffer::new();
        b.refill_with(packet(&[0x0b, 0xb0, 0x07])).unwrap();
        b.refill_with(|_| panic!("refilled a non-empty buffer"))
            .unwrap();
        assert_eq!(b.data(), &[0xb0, 0x07]);
    }

    #[test]
    fn test_timeout_and_short_packets() {
        let mut b = PacketBuffer::new();
        b.refill_with(|_| Ok(ReadOutcome::TimedOut)).unwrap();
        assert!(b.is_empty());

        b.refill_with(|_| Ok(ReadOutcome::Data(0))).unwrap();
        assert!(b.is_empty());

        b.refill_with(packet(&[0x0f])).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn test_oversized_report_clamped() {
        let mut b = PacketBuffer::new();
        b.refill_with(|_| Ok(ReadOutcome::Data(500))).unwrap();
        assert_eq!(b.remaining(), PACKET_SIZE - 1);
        assert_eq!(b.data().len(), PACKET_SIZE - 1);
    }

    #[test]
    fn test_copy_min() {
        let mut dest = [0u8; 2];
        assert_eq!(copy_min(&mut dest, &[1, 2, 3]), 2);
        assert_eq!(dest, [1, 2]);
        assert_eq!(copy_min(&mut dest, &[]), 0);
    }
}
