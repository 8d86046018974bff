/// Fixed-size bitmap of claimed short IDs. Bit `i` set means SID `i` is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidBitmap {
    words: Vec<u32>,
    len: usize,
}

impl SidBitmap {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(32)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        index < self.len && self.words[index / 32] & (1 << (index % 32)) != 0
    }

    /// Claim `index`. Returns `false` if it is out of range or already taken.
    pub fn claim(&mut self, index: usize) -> bool {
        if index >= self.len || self.is_claimed(index) {
            return false;
        }
        self.words[index / 32] |= 1 << (index % 32);
        true
    }

    /// Release `index`. Returns `false` if it was not claimed.
    pub fn release(&mut self, index: usize) -> bool {
        if !self.is_claimed(index) {
            return false;
        }
        self.words[index / 32] &= !(1 << (index % 32));
        true
    }

    /// Lowest unclaimed index.
    pub fn first_free(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u32::MAX)
            .map(|(i, w)| i * 32 + w.trailing_ones() as usize)
            .filter(|&index| index < self.len)
    }

    pub fn count_claimed(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_claimed(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&i| self.is_claimed(i))
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release() {
        let mut bits = SidBitmap::new(40);
        assert!(bits.claim(3));
        assert!(!bits.claim(3));
        assert!(bits.is_claimed(3));
        assert!(bits.release(3));
        assert!(!bits.release(3));
        assert!(!bits.claim(40));
    }

    #[test]
    fn first_free_skips_full_words() {
        let mut bits = SidBitmap::new(40);
        for i in 0..33 {
            assert!(bits.claim(i));
        }
        assert_eq!(bits.first_free(), Some(33));
        assert_eq!(bits.count_claimed(), 33);
    }

    #[test]
    fn first_free_respects_length() {
        let mut bits = SidBitmap::new(3);
        for i in 0..3 {
            bits.claim(i);
        }
        assert_eq!(bits.first_free(), None);
        assert_eq!(bits.iter_claimed().collect::<Vec<_>>(), vec![0, 1, 2]);
        bits.clear();
        assert_eq!(bits.count_claimed(), 0);
    }
}
