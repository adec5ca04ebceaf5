//! Synthetic price generators for the test feed producer
//!
//! Both models draw from a seeded ChaCha8 stream, so a given seed always
//! reproduces the same price path.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::PriceModel;

/// Floor applied by the GBM model.
const GBM_MIN_PRICE: f64 = 0.01;

/// Source of successive prices.
pub trait PriceGenerator: Send {
    fn next_price(&mut self) -> f64;
}

/// Fixed-step random walk: each step moves the price up or down by `step`.
/// A non-positive result resets the price to `step`.
pub struct RandomWalk {
    price: f64,
    step: f64,
    rng: ChaCha8Rng,
}

impl RandomWalk {
    pub fn new(start_price: f64, step: f64, seed: u64) -> Self {
        Self {
            price: start_price,
            step: step.abs(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl PriceGenerator for RandomWalk {
    fn next_price(&mut self) -> f64 {
        if self.rng.gen_bool(0.5) {
            self.price += self.step;
        } else {
            self.price -= self.step;
        }
        if self.price <= 0.0 {
            self.price = self.step;
        }
        self.price
    }
}

/// Geometric Brownian motion, Euler–Maruyama in log space:
/// `S' = S * exp((mu - sigma²/2) dt + sigma sqrt(dt) Z)`.
pub struct GeometricBrownianMotion {
    price: f64,
    mu: f64,
    sigma: f64,
    dt: f64,
    rng: ChaCha8Rng,
}

impl GeometricBrownianMotion {
    pub fn new(start_price: f64, mu: f64, sigma: f64, dt: f64, seed: u64) -> Self {
        Self {
            price: if start_price > 0.0 { start_price } else { 1.0 },
            mu,
            sigma,
            dt,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Standard normal draw (Box–Muller).
    fn standard_normal(&mut self) -> f64 {
        // gen::<f64>() is in [0, 1); shift to (0, 1] so ln() stays finite.
        let u1 = 1.0 - self.rng.gen::<f64>();
        let u2 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

impl PriceGenerator for GeometricBrownianMotion {
    fn next_price(&mut self) -> f64 {
        let z = self.standard_normal();
        let drift = (self.mu - 0.5 * self.sigma * self.sigma) * self.dt;
        let shock = self.sigma * self.dt.sqrt() * z;
        self.price *= (drift + shock).exp();
        if !(self.price > GBM_MIN_PRICE) {
            self.price = GBM_MIN_PRICE;
        }
        self.price
    }
}

/// Build the generator selected by `model`.
pub fn from_model(model: PriceModel, start_price: f64, seed: u64) -> Box<dyn PriceGenerator> {
    match model {
        PriceModel::RandomWalk { step } => Box::new(RandomWalk::new(start_price, step, seed)),
        PriceModel::Gbm { mu, sigma, dt } => {
            Box::new(GeometricBrownianMotion::new(start_price, mu, sigma, dt, seed))
        }
    }
}
