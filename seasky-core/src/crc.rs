//! Mode S parity: CRC-24 with generator 0xFFF409.
//!
//! All-call replies and extended squitters carry plain parity, so a clean
//! frame has remainder 0. Surveillance and Comm-B replies overlay the
//! parity with the aircraft address, so the remainder is the address.

use std::collections::HashMap;
use std::sync::LazyLock;

const GENERATOR: u32 = 0xFF_F409;
const MASK: u32 = 0xFF_FFFF;

/// Long (112-bit) frames are the only ones repaired.
const LONG_BITS: usize = 112;

/// The five DF bits are never flipped.
const PROTECTED_BITS: usize = 5;

static TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut reg = (i as u32) << 16;
        let mut n = 0;
        while n < 8 {
            reg = if reg & 0x80_0000 != 0 {
                (reg << 1) ^ GENERATOR
            } else {
                reg << 1
            };
            n += 1;
        }
        table[i] = reg & MASK;
        i += 1;
    }
    table
};

/// Remainder of the first `len - 3` bytes XOR'd with the trailing parity
/// field. Frames of 3 bytes or fewer are returned as-is.
pub fn crc24(data: &[u8]) -> u32 {
    let split = data.len().saturating_sub(3);
    let (body, parity) = data.split_at(split);

    let reg = body.iter().fold(0u32, |reg, &b| {
        let idx = ((reg >> 16) ^ u32::from(b)) & 0xFF;
        ((reg << 8) ^ TABLE[idx as usize]) & MASK
    });

    let field = parity
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    (reg ^ field) & MASK
}

/// Which bits a syndrome points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitFlip {
    One(usize),
    Two(usize, usize),
}

impl BitFlip {
    fn touches_df(self) -> bool {
        match self {
            BitFlip::One(a) => a < PROTECTED_BITS,
            BitFlip::Two(a, b) => a.min(b) < PROTECTED_BITS,
        }
    }

    fn apply(self, frame: &mut [u8]) {
        let mut flip = |bit: usize| frame[bit / 8] ^= 0x80u8 >> (bit % 8);
        match self {
            BitFlip::One(a) => flip(a),
            BitFlip::Two(a, b) => {
                flip(a);
                flip(b);
            }
        }
    }
}

/// Syndrome of every 1- and 2-bit error in a long frame.
static SYNDROMES: LazyLock<HashMap<u32, BitFlip>> = LazyLock::new(|| {
    let mut map = HashMap::with_capacity(LONG_BITS * LONG_BITS / 2);
    let mut probe = [0u8; LONG_BITS / 8];
    for a in 0..LONG_BITS {
        let single = BitFlip::One(a);
        single.apply(&mut probe);
        map.entry(crc24(&probe)).or_insert(single);
        single.apply(&mut probe);
    }
    for a in 0..LONG_BITS {
        for b in a + 1..LONG_BITS {
            let pair = BitFlip::Two(a, b);
            pair.apply(&mut probe);
            map.entry(crc24(&probe)).or_insert(pair);
            pair.apply(&mut probe);
        }
    }
    map
});

/// Repair up to two flipped bits in a long frame.
///
/// Returns the repaired copy, or `None` if the frame is short, the syndrome
/// is unknown, or the repair would touch the DF field.
pub fn try_fix(data: &[u8]) -> Option<Vec<u8>> {
    let syndrome = crc24(data);
    if syndrome == 0 {
        return Some(data.to_vec());
    }
    if data.len() * 8 != LONG_BITS {
        return None;
    }

    let flip = *SYNDROMES.get(&syndrome)?;
    if flip.touches_df() {
        return None;
    }

    let mut fixed = data.to_vec();
    flip.apply(&mut fixed);
    (crc24(&fixed) == 0).then_some(fixed)
}
