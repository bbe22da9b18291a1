//! 30-bit Morton codes (10 bits per axis) and their LSD radix sort.

/// Bits per axis. Coordinates must be below `1 << BITS_PER_AXIS`.
pub const BITS_PER_AXIS: u32 = 10;

/// Largest coordinate representable on one axis.
pub const MAX_COORD: u32 = (1 << BITS_PER_AXIS) - 1;

/// Total number of significant bits in a code.
pub const CODE_BITS: u32 = 3 * BITS_PER_AXIS;

const RADIX_BITS: u32 = 6;
const RADIX: usize = 1 << RADIX_BITS;

/// Spread the low 10 bits of `v` so that two zero bits separate each one.
#[inline]
fn expand_bits(v: u32) -> u32 {
    let mut v = v & MAX_COORD;
    v = (v | (v << 16)) & 0x0300_00FF;
    v = (v | (v << 8)) & 0x0300_F00F;
    v = (v | (v << 4)) & 0x030C_30C3;
    v = (v | (v << 2)) & 0x0924_9249;
    v
}

/// Inverse of [`expand_bits`].
#[inline]
fn compact_bits(v: u32) -> u32 {
    let mut v = v & 0x0924_9249;
    v = (v | (v >> 2)) & 0x030C_30C3;
    v = (v | (v >> 4)) & 0x0300_F00F;
    v = (v | (v >> 8)) & 0x0300_00FF;
    v = (v | (v >> 16)) & MAX_COORD;
    v
}

/// Interleave grid coordinates as `...z1y1x1 z0y0x0`.
///
/// Callers validate the grid size up front; larger coordinates would alias.
#[inline]
pub fn encode(x: u32, y: u32, z: u32) -> u32 {
    debug_assert!(
        x <= MAX_COORD && y <= MAX_COORD && z <= MAX_COORD,
        "morton coordinate out of range: ({x}, {y}, {z})"
    );
    expand_bits(x) | (expand_bits(y) << 1) | (expand_bits(z) << 2)
}

/// Recover `(x, y, z)` from a code produced by [`encode`].
#[inline]
pub fn decode(code: u32) -> (u32, u32, u32) {
    (compact_bits(code), compact_bits(code >> 1), compact_bits(code >> 2))
}

/// Whether a grid of the given size fits the 10-bit-per-axis encoding.
pub fn fits(dims: [u32; 3]) -> bool {
    dims.iter().all(|&d| d <= MAX_COORD + 1)
}

/// Sort codes ascending with an LSD radix sort, 6 bits per pass.
///
/// Five passes cover the 30 significant bits.
pub fn radix_sort(codes: &mut Vec<u32>) {
    let mut scratch = vec![0u32; codes.len()];
    let passes = CODE_BITS.div_ceil(RADIX_BITS);

    for pass in 0..passes {
        let shift = pass * RADIX_BITS;
        let mut counts = [0usize; RADIX];
        for &code in codes.iter() {
            counts[((code >> shift) as usize) & (RADIX - 1)] += 1;
        }

        let mut offset = 0;
        for count in counts.iter_mut() {
            let c = *count;
            *count = offset;
            offset += c;
        }

        for &code in codes.iter() {
            let digit = ((code >> shift) as usize) & (RADIX - 1);
            scratch[counts[digit]] = code;
            counts[digit] += 1;
        }
        std::mem::swap(codes, &mut scratch);
    }
}
