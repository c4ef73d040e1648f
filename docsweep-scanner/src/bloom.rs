//! Bloom filter used as the fast path of the dedup index.
//!
//! Three seeded hashes pick bits in a bitmap sized for the expected number of
//! URLs. A negative answer is exact; a positive answer only means "maybe", so
//! the frontier confirms against an exact set before rejecting a URL.

pub(crate) struct BloomFilter {
    words: Vec<u64>,
    bit_count: usize,
}

const SEEDS: [u64; 3] = [
    0x517c_c1b7_2722_0a95,
    0x6d0f_27bd_ceb7_b067,
    0x9e37_79b1_85eb_ca87,
];

// ~10 bits per item keeps the false-positive rate around 1% with 3 hashes.
const BITS_PER_ITEM: usize = 10;

impl BloomFilter {
    pub fn with_capacity(expected_items: usize) -> Self {
        let bits = (expected_items.max(64) * BITS_PER_ITEM).next_power_of_two();
        Self {
            words: vec![0u64; bits / 64],
            bit_count: bits,
        }
    }

    /// Sets the bits for `data`. Returns `true` if any bit flipped, i.e. the
    /// value was definitely not present before.
    pub fn insert(&mut self, data: &[u8]) -> bool {
        let mut inserted = false;
        for seed in SEEDS {
            let (word, mask) = self.slot(data, seed);
            if self.words[word] & mask == 0 {
                inserted = true;
                self.words[word] |= mask;
            }
        }
        inserted
    }

    pub fn might_contain(&self, data: &[u8]) -> bool {
        SEEDS.iter().all(|&seed| {
            let (word, mask) = self.slot(data, seed);
            self.words[word] & mask != 0
        })
    }

    fn slot(&self, data: &[u8], seed: u64) -> (usize, u64) {
        let idx = (hash(data, seed) as usize) % self.bit_count;
        (idx / 64, 1u64 << (idx % 64))
    }
}

fn hash(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed ^ data.len() as u64;
    for &byte in data {
        hash ^= (byte as u64).wrapping_mul(0x1000_0000_01b3);
        hash = hash.rotate_left(13).wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    hash ^ (hash >> 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_new_then_seen() {
        let mut bloom = BloomFilter::with_capacity(100);
        assert!(bloom.insert(b"https://docs.example.com/a"));
        assert!(!bloom.insert(b"https://docs.example.com/a"));
        assert!(bloom.might_contain(b"https://docs.example.com/a"));
    }

    #[test]
    fn test_unseen_values_are_mostly_absent() {
        let mut bloom = BloomFilter::with_capacity(1000);
        for i in 0..1000 {
            bloom.insert(format!("https://docs.example.com/page/{}", i).as_bytes());
        }
        let false_positives = (0..1000)
            .filter(|i| bloom.might_contain(format!("https://other.example.com/{}", i).as_bytes()))
            .count();
        assert!(false_positives < 50, "too many false positives: {}", false_positives);
    }
}
