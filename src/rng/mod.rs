//! Seeded random number generation
//!
//! A Mersenne-Twister (MT19937) generator used everywhere the pipeline needs
//! randomness: weight initialization, sample subsetting and fold shuffling.
//! Hand-rolled so that a given `random_seed` reproduces the same run on every
//! platform, independent of external RNG crate versions.

/// MT19937 generator with deterministic seeding
pub struct Mt19937 {
    state: [u32; 624],
    index: usize,
    /// Cached second output of the Box-Muller transform
    spare_normal: Option<f64>,
}

impl Mt19937 {
    const N: usize = 624;
    const M: usize = 397;
    const MATRIX_A: u32 = 0x9908_B0DF;
    const UPPER_MASK: u32 = 0x8000_0000;
    const LOWER_MASK: u32 = 0x7FFF_FFFF;

    /// Create a new generator from a seed (standard init_genrand seeding)
    pub fn new(seed: u64) -> Self {
        let mut rng = Mt19937 {
            state: [0; Self::N],
            index: Self::N,
            spare_normal: None,
        };
        rng.state[0] = seed as u32 ^ (seed >> 32) as u32;
        for i in 1..Self::N {
            let prev = rng.state[i - 1];
            rng.state[i] = 1_812_433_253u32
                .wrapping_mul(prev ^ (prev >> 30))
                .wrapping_add(i as u32);
        }
        rng
    }

    fn generate_block(&mut self) {
        for i in 0..Self::N {
            let y = (self.state[i] & Self::UPPER_MASK)
                | (self.state[(i + 1) % Self::N] & Self::LOWER_MASK);
            let mut next = self.state[(i + Self::M) % Self::N] ^ (y >> 1);
            if y & 1 == 1 {
                next ^= Self::MATRIX_A;
            }
            self.state[i] = next;
        }
        self.index = 0;
    }

    /// Next raw 32-bit value with standard MT tempering
    pub fn next_u32(&mut self) -> u32 {
        if self.index >= Self::N {
            self.generate_block();
        }
        let mut y = self.state[self.index];
        self.index += 1;

        y ^= y >> 11;
        y ^= (y << 7) & 0x9D2C_5680;
        y ^= (y << 15) & 0xEFC6_0000;
        y ^= y >> 18;
        y
    }

    /// Uniform f64 in [0, 1) with 53-bit resolution
    pub fn next_f64(&mut self) -> f64 {
        let a = (self.next_u32() >> 5) as f64; // 27 bits
        let b = (self.next_u32() >> 6) as f64; // 26 bits
        (a * 67_108_864.0 + b) / 9_007_199_254_740_992.0
    }

    /// Uniform usize in [0, n). n must be > 0.
    pub fn next_index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        (self.next_f64() * n as f64) as usize % n
    }

    /// Standard normal deviate (Box-Muller)
    pub fn next_normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        // u1 in (0, 1] to keep ln() finite
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        self.spare_normal = Some(r * theta.sin());
        r * theta.cos()
    }

    /// In-place Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_index(i + 1);
            items.swap(i, j);
        }
    }

    /// Choose k distinct indices out of n, returned in ascending order
    pub fn choose_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        self.shuffle(&mut indices);
        indices.truncate(k.min(n));
        indices.sort_unstable();
        indices
    }
}
