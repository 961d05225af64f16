//! Chunk arena: the `cnum` ciphertexts a logical vector is split across.

use std::ops::Index;

use crate::error::{config_err, Result};
use crate::scheme::Leveled;

/// Fixed-size array of chunk ciphertexts indexed `0..cnum`.
///
/// Chunks are only reachable by index or iteration; the arena cannot grow or
/// shrink after construction, and a replacement arena must have the same
/// length.
#[derive(Debug, Clone)]
pub struct ChunkArena<C> {
    chunks: Vec<C>,
}

impl<C> ChunkArena<C> {
    pub fn new(chunks: Vec<C>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(config_err!("chunk arena must hold at least one ciphertext"));
        }
        Ok(Self { chunks })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&C> {
        self.chunks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.chunks.iter()
    }

    pub fn as_slice(&self) -> &[C] {
        &self.chunks
    }

    /// Check this arena can stand in for `other` (same chunk count).
    pub fn check_same_shape<D>(&self, other: &ChunkArena<D>) -> Result<()> {
        if self.len() != other.len() {
            return Err(config_err!(
                "chunk count mismatch: {} vs {}",
                self.len(),
                other.len()
            ));
        }
        Ok(())
    }
}

impl<C: Leveled> ChunkArena<C> {
    /// Lowest level across the chunks
    pub fn level(&self) -> usize {
        self.chunks.iter().map(Leveled::level).min().unwrap_or(0)
    }

    /// Scale shared by every chunk, if they agree
    pub fn common_scale(&self) -> Option<u32> {
        let first = self.chunks.first()?.scale_bits();
        self.chunks
            .iter()
            .all(|c| c.scale_bits() == first)
            .then_some(first)
    }
}

impl<C> Index<usize> for ChunkArena<C> {
    type Output = C;

    fn index(&self, index: usize) -> &C {
        &self.chunks[index]
    }
}

impl<'a, C> IntoIterator for &'a ChunkArena<C> {
    type Item = &'a C;
    type IntoIter = std::slice::Iter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Fake(usize, u32);

    impl Leveled for Fake {
        fn level(&self) -> usize {
            self.0
        }
        fn scale_bits(&self) -> u32 {
            self.1
        }
    }

    #[test]
    fn test_empty_arena_rejected() {
        assert!(ChunkArena::<Fake>::new(vec![]).is_err());
    }

    #[test]
    fn test_level_and_scale() {
        let arena = ChunkArena::new(vec![Fake(5, 30), Fake(3, 30)]).unwrap();
        assert_eq!(arena.level(), 3);
        assert_eq!(arena.common_scale(), Some(30));
        assert_eq!(arena[1].0, 3);

        let mixed = ChunkArena::new(vec![Fake(5, 30), Fake(5, 20)]).unwrap();
        assert_eq!(mixed.common_scale(), None);
        assert!(arena.check_same_shape(&mixed).is_ok());
    }
}
