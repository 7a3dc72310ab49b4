//! Input stream used by deserializers.
//!
//! Reading past the end never fails: missing bytes read as zero and the
//! stream remembers it, which is how truncated records are detected and
//! flagged incomplete instead of rejected.

#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
    read_beyond_end: bool,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            read_beyond_end: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_read_beyond_end(&self) -> bool {
        self.read_beyond_end
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> &'a [u8] {
        &self.data[..self.position]
    }

    /// Fills `out` from the stream, zero-filling whatever lies past the end.
    pub fn read_into(&mut self, out: &mut [u8]) {
        let available = out.len().min(self.remaining());
        out[..available].copy_from_slice(&self.data[self.position..self.position + available]);
        out[available..].fill(0);
        if available < out.len() {
            self.read_beyond_end = true;
        }
        self.position += available;
    }

    pub fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.read_into(&mut out);
        out
    }

    pub fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        let mut out = vec![0u8; length];
        self.read_into(&mut out);
        out
    }

    pub fn skip(&mut self, length: usize) {
        let available = length.min(self.remaining());
        if available < length {
            self.read_beyond_end = true;
        }
        self.position += available;
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_array::<1>()[0]
    }

    pub fn read_u16_be(&mut self) -> u16 {
        u16::from_be_bytes(self.read_array())
    }

    pub fn read_u32_be(&mut self) -> u32 {
        u32::from_be_bytes(self.read_array())
    }

    pub fn read_u64_be(&mut self) -> u64 {
        u64::from_be_bytes(self.read_array())
    }
}
