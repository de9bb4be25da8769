//! Growable big-endian byte buffer with in-place patching

/// Append-only code buffer. Bytes already written can be overwritten
/// (`patch*`) to back-fill offsets once their targets are known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    // ========================================================================
    // APPEND
    // ========================================================================

    pub fn put1(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    /// Two bytes, opcode followed by a one-byte operand
    pub fn put11(&mut self, a: u8, b: u8) -> &mut Self {
        self.data.extend_from_slice(&[a, b]);
        self
    }

    pub fn put2(&mut self, value: u16) -> &mut Self {
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Opcode followed by a two-byte operand
    pub fn put12(&mut self, op: u8, value: u16) -> &mut Self {
        self.data.push(op);
        self.put2(value)
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put4(&mut self, value: u32) -> &mut Self {
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.data.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Append `count` zero bytes
    pub fn put_zeros(&mut self, count: usize) -> &mut Self {
        self.data.resize(self.data.len() + count, 0);
        self
    }

    // ========================================================================
    // PATCH / READ BACK
    // ========================================================================

    /// Overwrite two bytes at `pos`. Panics if `pos + 2` is past the end;
    /// callers only patch placeholders they wrote themselves.
    pub fn patch2(&mut self, pos: usize, value: i16) {
        self.data[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn patch4(&mut self, pos: usize, value: i32) {
        self.data[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn patch1(&mut self, pos: usize, value: u8) {
        self.data[pos] = value;
    }

    pub fn get1(&self, pos: usize) -> Option<u8> {
        self.data.get(pos).copied()
    }

    pub fn get2(&self, pos: usize) -> Option<i16> {
        read_i16(&self.data, pos)
    }

    pub fn get4(&self, pos: usize) -> Option<i32> {
        read_i32(&self.data, pos)
    }
}

/// Big-endian `u16` at `pos`, `None` past the end
pub fn read_u16(code: &[u8], pos: usize) -> Option<u16> {
    let bytes = code.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_i16(code: &[u8], pos: usize) -> Option<i16> {
    read_u16(code, pos).map(|v| v as i16)
}

pub fn read_i32(code: &[u8], pos: usize) -> Option<i32> {
    let bytes = code.get(pos..pos + 4)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
