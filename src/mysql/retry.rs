/// Where the connect phase stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// `n` attempts have been launched so far.
    Attempting(u32),
    Succeeded,
    Exhausted,
}

/// What the supervisor should do on a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Attempt { attempt: u32, generation: u64 },
    Exhausted,
    /// Already terminal; nothing to do.
    Idle,
}

/// Bounded, tick-driven connect retry.
///
/// Every launched attempt gets a fresh generation. Only the result of the most
/// recent generation may complete the phase; anything older is superseded.
#[derive(Debug, Clone)]
pub struct ConnectRetry {
    state: RetryState,
    max_attempts: u32,
    generation: u64,
}

impl ConnectRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: RetryState::Attempting(0),
            max_attempts,
            generation: 0,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn on_tick(&mut self) -> Tick {
        match self.state {
            RetryState::Attempting(n) if n < self.max_attempts => {
                self.state = RetryState::Attempting(n + 1);
                self.generation += 1;
                Tick::Attempt {
                    attempt: n + 1,
                    generation: self.generation,
                }
            }
            RetryState::Attempting(_) => {
                self.state = RetryState::Exhausted;
                Tick::Exhausted
            }
            RetryState::Succeeded | RetryState::Exhausted => Tick::Idle,
        }
    }

    /// Whether a result tagged with `generation` still matters.
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(self.state, RetryState::Attempting(_)) && generation == self.generation
    }

    /// Marks the phase succeeded if `generation` is current. Returns whether it was.
    pub fn succeed(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = RetryState::Succeeded;
        true
    }
}
