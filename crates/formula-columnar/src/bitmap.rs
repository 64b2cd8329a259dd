#![forbid(unsafe_code)]

/// A compact bit vector used for validity and boolean storage.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// Bits past `len` in the last word are always zero, so word-wise operations can count ones
/// without masking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64)),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_len_all_true(bits: usize) -> Self {
        if bits == 0 {
            return Self::new();
        }

        let mut words = vec![u64::MAX; bits.div_ceil(64)];
        let rem = bits % 64;
        if rem != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << rem) - 1;
            }
        }

        Self {
            words,
            len: bits,
            ones: bits,
        }
    }

    pub fn with_len_all_false(bits: usize) -> Self {
        Self {
            words: vec![0u64; bits.div_ceil(64)],
            len: bits,
            ones: 0,
        }
    }

    pub fn from_bools(bits: impl IntoIterator<Item = bool>) -> Self {
        let iter = bits.into_iter();
        let mut out = Self::with_capacity_bits(iter.size_hint().0);
        for bit in iter {
            out.push(bit);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }

        if value {
            let word = self.len / 64;
            self.words[word] |= 1u64 << bit;
            self.ones += 1;
        }

        self.len += 1;
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        let word = self.words[index / 64];
        ((word >> (index % 64)) & 1) == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        let word_idx = index / 64;
        let mask = 1u64 << (index % 64);
        let was_set = (self.words[word_idx] & mask) != 0;

        match (was_set, value) {
            (true, false) => {
                self.words[word_idx] &= !mask;
                self.ones -= 1;
            }
            (false, true) => {
                self.words[word_idx] |= mask;
                self.ones += 1;
            }
            _ => {}
        }
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn count_zeros(&self) -> usize {
        self.len - self.ones
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Indices of set bits, in increasing order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    /// Gather bits at `indices` into a new vector (indices may repeat).
    pub fn take(&self, indices: &[usize]) -> BitVec {
        BitVec::from_bools(indices.iter().map(|&i| self.get(i)))
    }

    /// Keep only the bits whose position is set in `mask`.
    pub fn filter(&self, mask: &BitVec) -> BitVec {
        debug_assert_eq!(self.len, mask.len, "BitVec length mismatch");
        if mask.all_true() {
            return self.clone();
        }
        let mut out = BitVec::with_capacity_bits(mask.count_ones());
        for idx in mask.iter_ones() {
            out.push(self.get(idx));
        }
        out
    }

    pub fn slice(&self, offset: usize, len: usize) -> BitVec {
        let end = (offset + len).min(self.len);
        let start = offset.min(end);
        BitVec::from_bools((start..end).map(|i| self.get(i)))
    }
}

impl Default for BitVec {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<bool> for BitVec {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self::from_bools(iter)
    }
}
