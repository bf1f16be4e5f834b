//! Fixed period cycle timing with overrun detection

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Keeps the executable's main loop on a fixed period.
#[derive(Debug)]
pub struct CycleManager {
    period: Duration,

    /// Number of cycles in one second, used for the 1 Hz flag.
    cycles_per_second: u128,

    cycle_start: Option<Instant>,

    /// Number of cycles already executed
    num_cycles: u128,

    /// Number of consecutive cycle overruns
    num_consec_overruns: u64,

    total_overruns: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How a cycle finished relative to its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// The cycle finished early, sleep for the contained duration.
    OnTime(Duration),

    /// The cycle overran its deadline by the contained duration.
    Overrun(Duration),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CycleError {
    #[error("The cycle period must be positive and finite, found {0} s")]
    InvalidPeriod(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CycleManager {
    pub fn new(period_s: f64) -> Result<Self, CycleError> {
        if !(period_s.is_finite() && period_s > 0.0) {
            return Err(CycleError::InvalidPeriod(period_s));
        }

        Ok(Self {
            period: Duration::from_secs_f64(period_s),
            cycles_per_second: ((1.0 / period_s).round() as u128).max(1),
            cycle_start: None,
            num_cycles: 0,
            num_consec_overruns: 0,
            total_overruns: 0,
        })
    }

    /// Mark the start of a cycle.
    pub fn start(&mut self) {
        self.cycle_start = Some(Instant::now());
    }

    /// Mark the end of a cycle started with `start`.
    pub fn end(&mut self) -> CycleEnd {
        let elapsed = self
            .cycle_start
            .take()
            .map(|s| s.elapsed())
            .unwrap_or_default();

        self.end_with(elapsed)
    }

    /// Mark the end of a cycle which took `elapsed`.
    pub fn end_with(&mut self, elapsed: Duration) -> CycleEnd {
        self.num_cycles += 1;

        match self.period.checked_sub(elapsed) {
            Some(d) => {
                self.num_consec_overruns = 0;
                CycleEnd::OnTime(d)
            }
            None => {
                let over = elapsed - self.period;
                self.num_consec_overruns += 1;
                self.total_overruns += 1;

                warn!(
                    "Cycle overran by {:.06} s ({} consecutive)",
                    over.as_secs_f64(),
                    self.num_consec_overruns
                );

                CycleEnd::Overrun(over)
            }
        }
    }

    /// True if the next cycle falls on a 1 Hz boundary.
    pub fn is_1_hz_cycle(&self) -> bool {
        self.num_cycles % self.cycles_per_second == 0
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn num_cycles(&self) -> u128 {
        self.num_cycles
    }

    pub fn num_consec_overruns(&self) -> u64 {
        self.num_consec_overruns
    }

    pub fn total_overruns(&self) -> u64 {
        self.total_overruns
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_overrun_counting() {
        let mut cm = CycleManager::new(0.02).unwrap();

        assert_eq!(
            cm.end_with(Duration::from_millis(5)),
            CycleEnd::OnTime(Duration::from_millis(15))
        );
        assert_eq!(cm.num_consec_overruns(), 0);

        assert_eq!(
            cm.end_with(Duration::from_millis(25)),
            CycleEnd::Overrun(Duration::from_millis(5))
        );
        cm.end_with(Duration::from_millis(30));
        assert_eq!(cm.num_consec_overruns(), 2);

        cm.end_with(Duration::from_millis(1));
        assert_eq!(cm.num_consec_overruns(), 0);
        assert_eq!(cm.total_overruns(), 2);
        assert_eq!(cm.num_cycles(), 4);
    }

    #[test]
    fn test_1_hz_flag() {
        let mut cm = CycleManager::new(0.02).unwrap();
        assert!(cm.is_1_hz_cycle());

        let mut flagged = 0;
        for _ in 0..100 {
            cm.end_with(Duration::ZERO);
            if cm.is_1_hz_cycle() {
                flagged += 1;
            }
        }
        assert_eq!(flagged, 2);
    }

    #[test]
    fn test_start_end() {
        let mut cm = CycleManager::new(10.0).unwrap();
        cm.start();

        assert!(matches!(cm.end(), CycleEnd::OnTime(_)));
        assert!(CycleManager::new(0.0).is_err());
        assert!(CycleManager::new(f64::NAN).is_err());
    }
}
