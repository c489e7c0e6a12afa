//! Identifier-space arithmetic.
//!
//! Keys and peers hash onto the same M-bit ring. These two functions are
//! the only place modular arithmetic appears; everything else reasons in
//! terms of "does this id fall in that arc".

use sha1::{Digest, Sha1};

/// Ring width in bits. Every peer in a deployment must agree on this.
pub const M: u32 = 8;

/// Number of identifiers on the ring.
pub const RING_SIZE: u64 = 1 << M;

const MASK: u64 = RING_SIZE - 1;

/// Hash an arbitrary string to an identifier in `[0, 2^M)`.
///
/// SHA-1 of the UTF-8 bytes, reduced mod `2^M`. The reduction only needs
/// the digest's low 64 bits since `2^M` divides `2^64`.
pub fn hash(key: &str) -> u64 {
    let digest = Sha1::digest(key.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[12..]);
    u64::from_be_bytes(tail) & MASK
}

/// Test whether `key_id` lies in the clockwise arc from `start_id` to
/// `end_id`, excluding the start and including the end iff `inclusive`.
///
/// When the arc wraps past zero the test is the negation of the
/// complement arc, which makes `start_id == end_id` span the entire ring —
/// exactly what lets a single-node ring claim every key.
pub fn in_interval(key_id: u64, start_id: u64, end_id: u64, inclusive: bool) -> bool {
    let x = key_id & MASK;
    let a = start_id & MASK;
    let b = end_id & MASK;

    if a < b {
        if inclusive { a < x && x <= b } else { a < x && x < b }
    } else if inclusive {
        !(b < x && x <= a)
    } else {
        !(b < x && x < a)
    }
}
