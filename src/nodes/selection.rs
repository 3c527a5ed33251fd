// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::registry::Worker;

/// Seed derived from the contest id: the first 8 bytes of its SHA-256 digest,
/// big-endian.
pub fn contest_seed(contest_id: &str) -> u64 {
    let digest = Sha256::digest(contest_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// `max(min_consensus, min(available, available / 2 + 1))`
pub fn default_selection_size(available: usize, min_consensus: usize) -> usize {
    min_consensus.max(available.min(available / 2 + 1))
}

/// Weighted sampling without replacement, seeded from the contest id.
///
/// `candidates` must be in a stable order (the registry's availability order)
/// for the draw to be reproducible. Returns at most `n` workers; fewer when
/// the candidate list runs out.
pub fn select_weighted(contest_id: &str, candidates: &[Worker], n: usize) -> Vec<Worker> {
    let mut rng = StdRng::seed_from_u64(contest_seed(contest_id));
    let mut remaining: Vec<&Worker> = candidates.iter().collect();
    let mut selected = Vec::with_capacity(n.min(candidates.len()));

    while selected.len() < n && !remaining.is_empty() {
        let weights: Vec<u32> = remaining.iter().map(|w| w.weight.max(1)).collect();
        let index = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut rng),
            Err(_) => 0,
        };
        let worker = remaining.remove(index);
        selected.push(worker.clone());
    }

    debug!(
        "[SELECTION] contest {} drew {} of {} candidate(s)",
        contest_id,
        selected.len(),
        candidates.len()
    );
    selected
}
