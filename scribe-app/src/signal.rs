//! The traffic signal: the boolean admission-control output the
//! external load balancer consumes.
//!
//! The signal duty-cycles under load with hysteresis (once it turns
//! on, it stays on for a minimum window) and goes hard-off while the
//! server is unhealthy or draining. A hard-off clears when health
//! returns; draining is terminal.

use thiserror::Error;

/// Minimum time the signal stays on after turning on, in msec.
pub const MIN_ON_MSEC: u64 = 60_000;

/// Load factor at or below which the signal stays on.
pub const MIN_LF_FOR_DUTY: u64 = 75;

/// Load factor at or above which the off window maxes out.
pub const MAX_LF_FOR_DUTY: u64 = 150;

const MIN_F: f64 = 0.10;
const MAX_F: f64 = 0.50;

/// "Not before the hard-off cause clears."
const NEVER: u64 = u64::MAX;

/// Errors from the signal's time discipline.
#[derive(Debug, Error)]
pub enum SignalError {
    /// `now` must monotonically increase across calls.
    #[error("time went backwards: {now} < {last}")]
    TimeWentBackwards {
        /// The offending evaluation time.
        now: u64,
        /// The previous evaluation time.
        last: u64,
    },
}

/// The admission state machine. External inputs (health, load factor,
/// shutdown) are set between evaluations; each evaluation at a
/// monotonically increasing `now` yields the current `allow` output.
#[derive(Debug)]
pub struct TrafficSignal {
    healthy: bool,
    load_factor: u64,
    shutting_down: bool,
    allow: bool,
    /// When the signal may turn on again (valid while off).
    allow_at: u64,
    /// End of the minimum-on window (valid while on).
    force_until: u64,
    last_now: Option<u64>,
    reason: &'static str,
}

impl TrafficSignal {
    /// A healthy, unloaded, allowing signal.
    pub fn new() -> Self {
        Self {
            healthy: true,
            load_factor: 0,
            shutting_down: false,
            allow: true,
            allow_at: 0,
            force_until: 0,
            last_now: None,
            reason: "ok",
        }
    }

    /// Report the health-check outcome.
    pub fn set_healthy(&mut self, healthy: bool) {
        self.healthy = healthy;
    }

    /// Report the latest load factor.
    pub fn set_load_factor(&mut self, load_factor: u64) {
        self.load_factor = load_factor;
    }

    /// Report that shutdown has begun. There is no way back.
    pub fn set_shutting_down(&mut self) {
        self.shutting_down = true;
    }

    /// Drive the signal off until `allow_at`. An operational override
    /// and the test seam for the off state.
    pub fn force_off_until(&mut self, allow_at: u64) {
        self.allow = false;
        self.allow_at = allow_at;
        self.reason = "forced off";
    }

    /// The latest output without re-evaluating.
    pub fn allow(&self) -> bool {
        self.allow
    }

    /// Why the signal is in its current state.
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// When the signal would next allow traffic (meaningful while
    /// off; the never-sentinel while hard-off).
    pub fn allow_at(&self) -> u64 {
        self.allow_at
    }

    /// End of the current minimum-on window (meaningful while on).
    pub fn force_until(&self) -> u64 {
        self.force_until
    }

    /// Evaluate the signal at `now` (msec). `now` must not decrease
    /// across calls.
    pub fn should_allow_traffic_at(&mut self, now: u64) -> Result<bool, SignalError> {
        if let Some(last) = self.last_now {
            if now < last {
                return Err(SignalError::TimeWentBackwards { now, last });
            }
        }
        self.last_now = Some(now);

        if self.shutting_down || !self.healthy {
            self.allow = false;
            self.allow_at = NEVER;
            self.reason = if self.shutting_down {
                "shutting down"
            } else {
                "unhealthy"
            };
            return Ok(false);
        }
        if !self.allow && self.allow_at == NEVER {
            // The hard-off cause cleared; re-arm immediately.
            self.allow_at = now;
        }

        if self.allow && now < self.force_until {
            self.reason = "minimum on window";
            return Ok(true);
        }
        if !self.allow {
            if now >= self.allow_at {
                self.allow = true;
                self.force_until = now + MIN_ON_MSEC;
                self.reason = "minimum on window";
                return Ok(true);
            }
            return Ok(false);
        }
        if self.load_factor <= MIN_LF_FOR_DUTY {
            self.reason = "ok";
            return Ok(true);
        }
        let off = off_msec(self.load_factor);
        self.allow = false;
        self.allow_at = now + off;
        self.reason = "duty cycle";
        Ok(false)
    }
}

impl Default for TrafficSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// How long the signal stays off for a given load factor, from the
/// duty-cycle formula.
pub fn off_msec(load_factor: u64) -> u64 {
    if load_factor < MIN_LF_FOR_DUTY {
        return 0;
    }
    let scaled = ((load_factor - MIN_LF_FOR_DUTY) as f64
        / (MAX_LF_FOR_DUTY - MIN_LF_FOR_DUTY) as f64)
        .clamp(0.0, 1.0);
    let fraction = scaled * (MAX_F - MIN_F) + MIN_F;
    (fraction * MIN_ON_MSEC as f64 / (1.0 - fraction)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_cycle_boundary_values() {
        assert_eq!(off_msec(74), 0);
        assert_eq!(off_msec(75), 6_667);
        assert_eq!(off_msec(150), 60_000);
        assert_eq!(off_msec(151), 60_000);
        assert_eq!(off_msec(10_000), 60_000);
    }

    #[test]
    fn time_must_not_go_backwards() {
        let mut signal = TrafficSignal::new();
        signal.should_allow_traffic_at(100).unwrap();
        assert!(matches!(
            signal.should_allow_traffic_at(99),
            Err(SignalError::TimeWentBackwards { now: 99, last: 100 })
        ));
        // The same instant is fine.
        signal.should_allow_traffic_at(100).unwrap();
    }

    #[test]
    fn light_load_stays_on() {
        let mut signal = TrafficSignal::new();
        signal.set_load_factor(MIN_LF_FOR_DUTY);
        for now in [0, 10, 20] {
            assert!(signal.should_allow_traffic_at(now).unwrap());
        }
        assert_eq!(signal.reason(), "ok");
    }

    #[test]
    fn heavy_load_duty_cycles_off() {
        let mut signal = TrafficSignal::new();
        signal.set_load_factor(150);
        // The fresh signal's minimum-on window has passed at 0.
        assert!(!signal.should_allow_traffic_at(0).unwrap());
        assert_eq!(signal.reason(), "duty cycle");
        assert_eq!(signal.allow_at(), 60_000);
        // Off until the window elapses.
        assert!(!signal.should_allow_traffic_at(59_999).unwrap());
        assert!(signal.should_allow_traffic_at(60_000).unwrap());
    }

    #[test]
    fn hysteresis_holds_the_signal_on() {
        let mut signal = TrafficSignal::new();
        signal.force_off_until(1_000);
        assert!(!signal.should_allow_traffic_at(999).unwrap());
        assert!(signal.should_allow_traffic_at(1_000).unwrap());
        assert_eq!(signal.force_until(), 61_000);

        signal.set_load_factor(200);
        for now in [1_001, 30_000, 60_999] {
            assert!(signal.should_allow_traffic_at(now).unwrap(), "at {now}");
        }
        assert!(!signal.should_allow_traffic_at(61_000).unwrap());
        assert_eq!(signal.allow_at(), 61_000 + 60_000);
    }

    #[test]
    fn shutdown_is_hard_off_and_terminal() {
        let mut signal = TrafficSignal::new();
        signal.set_shutting_down();
        assert!(!signal.should_allow_traffic_at(0).unwrap());
        assert_eq!(signal.reason(), "shutting down");
        assert_eq!(signal.allow_at(), u64::MAX);
        signal.set_load_factor(0);
        assert!(!signal.should_allow_traffic_at(1_000_000).unwrap());
    }

    #[test]
    fn unhealthy_is_hard_off_until_health_returns() {
        let mut signal = TrafficSignal::new();
        signal.set_healthy(false);
        assert!(!signal.should_allow_traffic_at(0).unwrap());
        assert_eq!(signal.reason(), "unhealthy");
        signal.set_healthy(true);
        assert!(signal.should_allow_traffic_at(10).unwrap());
    }
}
