//! Key list loading and random sampling

use crate::error::{HarnessError, HarnessResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Field delimiter in the key list
pub const DELIMITER: char = '|';

/// One `vendor|product` pair to compare
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComparisonKey {
    pub vendor: String,
    pub product: String,
}

impl ComparisonKey {
    pub fn new(vendor: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            product: product.into(),
        }
    }

    /// Split a line on the first delimiter; `None` if there is none
    pub fn parse(line: &str) -> Option<Self> {
        line.split_once(DELIMITER)
            .map(|(vendor, product)| Self::new(vendor, product))
    }
}

impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.vendor, DELIMITER, self.product)
    }
}

/// Read every key from the list file, in file order.
///
/// Blank lines are ignored. A non-blank line without a delimiter fails
/// the whole load.
pub fn load_keys(path: &Path) -> HarnessResult<Vec<ComparisonKey>> {
    if !path.is_file() {
        return Err(HarnessError::ListNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| HarnessError::ReadList {
        path: path.to_path_buf(),
        source,
    })?;

    let mut keys = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let key = ComparisonKey::parse(line).ok_or_else(|| HarnessError::MalformedInput {
            path: path.to_path_buf(),
            line: idx + 1,
            content: line.to_string(),
        })?;
        keys.push(key);
    }

    debug!("Loaded {} keys from {:?}", keys.len(), path);
    Ok(keys)
}

/// Number of keys drawn for a list of `total` at `rate`
pub fn sample_size(total: usize, rate: f64) -> usize {
    ((total as f64 * rate).ceil() as usize).min(total)
}

/// Draw `ceil(len * rate)` keys uniformly without replacement
pub fn sample<R: Rng + ?Sized>(keys: &[ComparisonKey], rate: f64, rng: &mut R) -> Vec<ComparisonKey> {
    let amount = sample_size(keys.len(), rate);
    keys.choose_multiple(rng, amount).cloned().collect()
}

/// Sample with a seeded RNG, or a fresh random seed when none is given.
///
/// The seed actually used is logged so a run can be replayed.
pub fn sample_seeded(keys: &[ComparisonKey], rate: f64, seed: Option<u64>) -> Vec<ComparisonKey> {
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let sampled = sample(keys, rate, &mut rng);
    info!(
        seed,
        total = keys.len(),
        sampled = sampled.len(),
        "Sampled keys at rate {}",
        rate
    );
    sampled
}
