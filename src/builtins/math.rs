fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// xorshift generator behind `rand()`/`srand()`.
///
/// Lives in the interpreter's runtime state; the initial seed is 0 so a
/// program that never calls `srand()` produces the same sequence every run.
#[derive(Debug, Clone)]
pub struct Rng {
    seed: f64,
    state: u64,
}

impl Default for Rng {
    fn default() -> Self {
        Rng::with_seed(0.0)
    }
}

impl Rng {
    pub fn with_seed(seed: f64) -> Self {
        // xorshift must never sit at zero
        let state = splitmix64(seed.to_bits()).max(1);
        Rng { seed, state }
    }

    /// Next value in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        let mut s = self.state;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.state = s;
        (s >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Reseed and return the previous seed, as `srand()` does.
    pub fn reseed(&mut self, seed: f64) -> f64 {
        let prev = self.seed;
        *self = Rng::with_seed(seed);
        prev
    }
}

/// Seed used by `srand()` without an argument: the time of day in seconds.
pub fn time_seed() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as f64)
        .unwrap_or(0.0)
}

/// `int(x)`: truncate toward zero.
pub fn int(x: f64) -> f64 {
    x.trunc()
}
