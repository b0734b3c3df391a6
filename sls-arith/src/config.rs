//! Engine configuration.

/// Tuning knobs for the local search.
///
/// Probabilities expressed as an integer numerator are taken over a 2048
/// denominator, matching the solver parameter convention.
#[derive(Debug, Clone)]
pub struct SlsConfig {
    /// Initial PAWS weight per assertion (at least 1).
    pub paws_init: u32,
    /// Numerator over 2048 for decrementing the weight of a satisfied root.
    pub paws_sp: u32,
    /// Numerator over 2048 for taking a pure random inc/dec move.
    pub wp: u32,
    /// Rescore cadence in moves, and the restart schedule increment.
    pub restart_base: u64,
    /// Moves granted per search invocation; grows by 100 on exhaustion.
    pub max_moves_base: u64,
    /// Gate for the global lookahead search.
    pub use_lookahead: bool,
    /// Score base for break penalties; must be greater than 1.
    pub cb: f64,
    /// Enable UCB selection of the candidate unsatisfied assertion.
    pub ucb: bool,
    /// Exploration constant of the UCB term.
    pub ucb_constant: f64,
    /// Random noise added to the UCB score.
    pub ucb_noise: f64,
    /// Decay applied to UCB touch counters on rescore (below 1 enables it).
    pub ucb_forget: f64,
    /// Cap on the candidate move list; excess candidates are dropped at
    /// random before scoring.
    pub updates_max_size: usize,
    /// Half-width of the admissible value window per variable.
    pub var_range: i64,
}

impl Default for SlsConfig {
    fn default() -> Self {
        Self {
            paws_init: 40,
            paws_sp: 52,
            wp: 100,
            restart_base: 1000,
            max_moves_base: 800,
            use_lookahead: true,
            cb: 2.85,
            ucb: true,
            ucb_constant: 1.0,
            ucb_noise: 0.0002,
            ucb_forget: 0.1,
            updates_max_size: 45,
            var_range: 100_000_000,
        }
    }
}
