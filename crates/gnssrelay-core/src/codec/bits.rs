/// Big-endian bit reader over a byte slice.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read `width` bits (at most 32); `None` past the end.
    pub(crate) fn read(&mut self, width: usize) -> Option<u32> {
        if width > 32 || self.pos + width > self.data.len() * 8 {
            return None;
        }
        let mut value: u32 = 0;
        for _ in 0..width {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Some(value)
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }
}
