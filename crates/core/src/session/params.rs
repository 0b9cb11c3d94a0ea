//! Effective model parameters for a session.
//!
//! Configured parameters are clamped here before they reach the backend.

use lc_protocol::session_models::ModelParameters;
use serde::Serialize;

/// Smallest context size handed to a backend.
pub const MIN_CONTEXT_SIZE: u32 = 512;

/// Smallest thread count on machines with at least this many cores.
const MIN_THREADS: usize = 4;

/// Parameters actually used to load and run a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveParameters {
    pub context_size: u32,
    pub num_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub batch_size: u32,
    pub repeat_penalty: f32,
    pub last_n_tokens: u32,
    pub seed: Option<u32>,
    pub thread_count: usize,
}

impl EffectiveParameters {
    /// Derive effective parameters for a machine with `core_count` cores.
    ///
    /// - The context size is raised to at least [`MIN_CONTEXT_SIZE`].
    /// - Without an override, the thread count is `max(cores - 2, 4)` on
    ///   machines with 4 or more cores and `cores` otherwise.
    /// - An override is clamped into `[4, cores]`, or `[1, cores]` when the
    ///   machine has fewer than 4 cores.
    pub fn derive(configured: &ModelParameters, core_count: usize) -> Self {
        let cores = core_count.max(1);
        let thread_count = match configured.thread_count {
            Some(requested) => clamp_thread_count(requested, cores),
            None => default_thread_count(cores),
        };

        Self {
            context_size: configured.context_size.max(MIN_CONTEXT_SIZE),
            num_tokens: configured.num_tokens,
            temperature: configured.temperature,
            top_k: configured.top_k,
            top_p: configured.top_p,
            batch_size: configured.batch_size,
            repeat_penalty: configured.repeat_penalty,
            last_n_tokens: configured.last_n_tokens,
            seed: configured.seed,
            thread_count,
        }
    }
}

fn default_thread_count(cores: usize) -> usize {
    if cores >= MIN_THREADS {
        (cores - 2).max(MIN_THREADS)
    } else {
        cores
    }
}

fn clamp_thread_count(requested: usize, cores: usize) -> usize {
    let floor = if cores >= MIN_THREADS { MIN_THREADS } else { 1 };
    requested.clamp(floor, cores)
}

/// Number of logical cores, or 1 when it cannot be determined.
pub fn core_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
