//! Seeded PRNG for deterministic dry runs.
//!
//! Mulberry32 over a 32-bit state, chosen because platform RNGs do not agree
//! bit-for-bit. Every arithmetic step uses wrapping 32-bit operations so the
//! stream is identical on every target.

/// Deterministic 32-bit PRNG. Cloning snapshots the stream position.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    /// Seeds are truncated modulo 2^32; zero coerces to 1 so the state is
    /// never the fixed point.
    pub fn new(seed: u64) -> Self {
        let state = (seed % (1u64 << 32)) as u32;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    /// Next value in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^= t >> 14;
        f64::from(t) / 4_294_967_296.0
    }

    pub fn next_float(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next()
    }

    /// Uniform integer in `[min(lo, hi), max(lo, hi)]` inclusive.
    pub fn next_int(&mut self, lo: i64, hi: i64) -> i64 {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        self.next_float(lo as f64, hi as f64 + 1.0).floor() as i64
    }

    /// `n` lowercase hex digits.
    pub fn next_hex(&mut self, n: usize) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        (0..n)
            .map(|_| HEX[self.next_int(0, 15) as usize] as char)
            .collect()
    }

    /// New stream whose state is the current state XOR the normalized salt.
    /// Does not advance this stream.
    pub fn fork(&self, salt: u32) -> Self {
        let salt = if salt == 0 { 1 } else { salt };
        Self::new(u64::from(self.state ^ salt))
    }

    /// Like [`fork`](Self::fork), salting with FNV-1a over the label's UTF-8
    /// bytes.
    pub fn fork_label(&self, label: &str) -> Self {
        Self::new(u64::from(self.state ^ fnv1a32(label)))
    }
}

pub fn fnv1a32(text: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Mulberry32::new(42);
        let mut b = Mulberry32::new(42);
        for _ in 0..32 {
            assert_eq!(a.next().to_bits(), b.next().to_bits());
        }
    }

    #[test]
    fn zero_seed_coerces_to_one() {
        let mut zero = Mulberry32::new(0);
        let mut one = Mulberry32::new(1);
        assert_eq!(zero.next().to_bits(), one.next().to_bits());
    }

    #[test]
    fn seed_truncates_modulo_u32() {
        let mut wide = Mulberry32::new((1u64 << 32) + 7);
        let mut narrow = Mulberry32::new(7);
        assert_eq!(wide.next().to_bits(), narrow.next().to_bits());
    }

    #[test]
    fn next_stays_in_unit_interval() {
        let mut rng = Mulberry32::new(9);
        for _ in 0..1000 {
            let value = rng.next();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn next_int_is_inclusive_and_order_insensitive() {
        let mut rng = Mulberry32::new(3);
        for _ in 0..1000 {
            let value = rng.next_int(5, 1);
            assert!((1..=5).contains(&value));
        }
        let mut rng = Mulberry32::new(3);
        assert_eq!(rng.next_int(4, 4), 4);
    }

    #[test]
    fn next_hex_emits_lowercase_digits() {
        let mut rng = Mulberry32::new(11);
        let hex = rng.next_hex(16);
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fork_is_deterministic_and_leaves_parent_untouched() {
        let parent = Mulberry32::new(5);
        let mut first = parent.fork(0x3f1c2b);
        let mut second = parent.fork(0x3f1c2b);
        assert_eq!(first.next().to_bits(), second.next().to_bits());

        let mut untouched = Mulberry32::new(5);
        let mut parent = parent;
        assert_eq!(parent.next().to_bits(), untouched.next().to_bits());
    }

    #[test]
    fn fork_label_differs_per_label() {
        let parent = Mulberry32::new(5);
        let mut a = parent.fork_label("run_qlip");
        let mut b = parent.fork_label("batch_validate");
        assert_ne!(a.next().to_bits(), b.next().to_bits());
    }

    #[test]
    fn fnv1a_known_vectors() {
        // Standard FNV-1a 32-bit test vectors.
        assert_eq!(fnv1a32(""), 0x811c_9dc5);
        assert_eq!(fnv1a32("a"), 0xe40c_292c);
        assert_eq!(fnv1a32("foobar"), 0xbf9c_f968);
    }
}
