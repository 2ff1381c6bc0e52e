use std::fmt;

use crate::codec::BitOrder;

/// Bits in one controller response
pub const RESPONSE_BITS: usize = 64;

/// Bytes emitted per response
pub const RESPONSE_BYTES: usize = RESPONSE_BITS / 8;

/// Response bit accumulator
#[derive(Debug, Clone)]
pub struct ResponseRegister {
    bits: [bool; RESPONSE_BITS],
    position: usize,
}

impl ResponseRegister {
    pub fn new() -> Self {
        Self {
            bits: [false; RESPONSE_BITS],
            position: 0,
        }
    }

    /// Store the next bit. Returns `true` when the register is full.
    ///
    /// Bits past the 64th are dropped.
    pub fn push(&mut self, bit: bool) -> bool {
        if self.position < RESPONSE_BITS {
            self.bits[self.position] = bit;
            self.position += 1;
        }
        self.is_full()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_full(&self) -> bool {
        self.position == RESPONSE_BITS
    }

    /// Output byte `idx`, built from bits `8 * idx .. 8 * idx + 8`
    pub fn byte(&self, idx: usize, order: BitOrder) -> u8 {
        order.pack(&self.bits[idx * 8..idx * 8 + 8])
    }

    pub fn to_response(&self, order: BitOrder) -> Response {
        let mut bytes = [0u8; RESPONSE_BYTES];
        for (idx, byte) in bytes.iter_mut().enumerate() {
            *byte = self.byte(idx, order);
        }
        Response(bytes)
    }

    pub fn clear(&mut self) {
        self.bits = [false; RESPONSE_BITS];
        self.position = 0;
    }
}

impl Default for ResponseRegister {
    fn default() -> Self {
        Self::new()
    }
}

/// Eight response bytes of one completed poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Response(pub [u8; RESPONSE_BYTES]);

impl Response {
    pub fn as_bytes(&self) -> &[u8; RESPONSE_BYTES] {
        &self.0
    }

    /// Response read as a big-endian word, byte 0 most significant
    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for Response {
    fn from(value: u64) -> Self {
        Response(value.to_be_bytes())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_in_order() {
        let mut reg = ResponseRegister::new();
        for i in 0..RESPONSE_BITS {
            assert!(!reg.is_full());
            let full = reg.push(i >= 32);
            assert_eq!(full, i == RESPONSE_BITS - 1);
        }
        assert_eq!(reg.position(), 64);
        assert_eq!(reg.to_response(BitOrder::MsbFirst).to_u64(), 0x0000_0000_ffff_ffff);
    }

    #[test]
    fn packing_order_applies_per_byte() {
        let mut reg = ResponseRegister::new();
        reg.push(true);
        for _ in 1..RESPONSE_BITS {
            reg.push(false);
        }
        assert_eq!(reg.byte(0, BitOrder::MsbFirst), 0x80);
        assert_eq!(reg.byte(0, BitOrder::LsbFirst), 0x01);
        assert_eq!(reg.byte(1, BitOrder::MsbFirst), 0x00);
    }

    #[test]
    fn clear_resets_position() {
        let mut reg = ResponseRegister::new();
        reg.push(true);
        reg.push(true);
        reg.clear();
        assert_eq!(reg.position(), 0);
        assert_eq!(reg.to_response(BitOrder::MsbFirst), Response::default());
    }

    #[test]
    fn response_formats_as_hex() {
        let response = Response::from(0x0000_0000_ffff_ff01u64);
        assert_eq!(response.to_string(), "00 00 00 00 ff ff ff 01");
    }
}
