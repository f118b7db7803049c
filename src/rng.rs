//! Fast non-cryptographic random numbers, one generator per worker.

use rand::RngCore;

use crate::real;

/// xorshift64* generator.
///
/// Workers each own one, seeded from the run seed and their worker id, so
/// nothing about random draws is shared between threads.
#[derive(Debug, Clone)]
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        // splitmix64 so that consecutive seeds give unrelated streams
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        // all-zero is a fixed point of xorshift
        Rng(if z == 0 { 0x2545_F491_4F6C_DD1D } else { z })
    }

    /// Seed for worker `id` in a run seeded with `seed`.
    pub fn for_worker(seed: u64, id: usize) -> Self {
        Rng::new(seed ^ (id as u64).wrapping_mul(0xD1B5_4A32_D192_ED03))
    }

    pub fn rand_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() >> 40) as real / (1u64 << 24) as real
    }

    /// Get a uniformly distributed integer in `0 .. n`. `n` must be nonzero.
    pub fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        (self.rand_u64() % n as u64) as usize
    }
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        (self.rand_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.rand_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.rand_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
