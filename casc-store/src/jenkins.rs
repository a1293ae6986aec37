//! Port of Bob Jenkins' `lookup3.c` hash to Rust.
//!
//! The `.idx` files protect their header and data sections with lookup3
//! checksums: a single-seed hash for the header, and a chained two-word
//! hash accumulated record by record for the data section.
//!
//! Not a cryptographic hash.

/// Mix three `u32` values reversibly.
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);

    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

/// Final mix of three `u32` values.
fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));

    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));

    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));

    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));

    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));

    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));

    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

fn word(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf[..bytes.len().min(4)].copy_from_slice(&bytes[..bytes.len().min(4)]);
    u32::from_le_bytes(buf)
}

/// Hash a byte string into a single `u32`.
pub fn hashlittle(key: &[u8], initval: u32) -> u32 {
    let mut pc = initval;
    let mut pb = 0;
    hashlittle2(key, &mut pc, &mut pb);
    pc
}

/// Produce two chained `u32` hash values over `key`.
///
/// `pc` and `pb` seed the hash and receive the result, so successive calls
/// accumulate, which is how the `.idx` data section is checksummed.
pub fn hashlittle2(key: &[u8], pc: &mut u32, pb: &mut u32) {
    let mut a = 0xdeadbeef_u32
        .wrapping_add(key.len() as u32)
        .wrapping_add(*pc);
    let mut b = a;
    let mut c = a.wrapping_add(*pb);

    if key.is_empty() {
        *pc = c;
        *pb = b;
        return;
    }

    // Whole 12-byte blocks, keeping the last (possibly full) block for the
    // tail handling below, as the reference implementation does.
    let mut k = key;
    while k.len() > 12 {
        a = a.wrapping_add(word(&k[0..4]));
        b = b.wrapping_add(word(&k[4..8]));
        c = c.wrapping_add(word(&k[8..12]));
        mix(&mut a, &mut b, &mut c);
        k = &k[12..];
    }

    // The C original reads the tail with short loads, treating the missing
    // high bytes as zero; `word` zero-pads the same way.
    a = a.wrapping_add(word(&k[..k.len().min(4)]));
    if k.len() > 4 {
        b = b.wrapping_add(word(&k[4..k.len().min(8)]));
    }
    if k.len() > 8 {
        c = c.wrapping_add(word(&k[8..k.len().min(12)]));
    }

    final_mix(&mut a, &mut b, &mut c);

    *pc = c;
    *pb = b;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_returns_seed_mix() {
        // With no data the function returns the initialized state directly.
        assert_eq!(hashlittle(b"", 0), 0xdeadbeef);
    }

    #[test]
    fn seeds_change_the_result() {
        let h0 = hashlittle(b"Four score and seven years ago", 0);
        let h1 = hashlittle(b"Four score and seven years ago", 1);
        assert_ne!(h0, h1);
    }

    #[test]
    fn all_tail_lengths_are_distinct() {
        let data = b"abcdefghijklmnopqrstuvwxyz";
        let mut seen = std::collections::HashSet::new();
        for len in 0..=data.len() {
            assert!(seen.insert(hashlittle(&data[..len], 0)), "len {len}");
        }
    }

    #[test]
    fn chained_hash_is_deterministic() {
        let records: [&[u8]; 3] = [b"record one roughly", b"record two roughly", b"tail"];

        let (mut pc1, mut pb1) = (0u32, 0u32);
        for r in records {
            hashlittle2(r, &mut pc1, &mut pb1);
        }

        let (mut pc2, mut pb2) = (0u32, 0u32);
        for r in records {
            hashlittle2(r, &mut pc2, &mut pb2);
        }

        assert_eq!((pc1, pb1), (pc2, pb2));

        // Chaining is order-sensitive.
        let (mut pc3, mut pb3) = (0u32, 0u32);
        for r in records.iter().rev() {
            hashlittle2(r, &mut pc3, &mut pb3);
        }
        assert_ne!((pc1, pb1), (pc3, pb3));
    }
}
