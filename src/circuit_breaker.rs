use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Circuit breaker guarding the geocoding provider.
pub type GeocodeCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for geocoding calls so an unreachable provider
/// fails fast instead of stalling every aggregation on its timeout.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive transport failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast.
/// - **HALF_OPEN**: Testing if the provider recovered.
///
/// Only transport-level failures count. A well-formed `ZERO_RESULTS` answer is
/// a successful call as far as the breaker is concerned.
pub fn create_geocode_circuit_breaker() -> GeocodeCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
