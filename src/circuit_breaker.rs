use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Breaker guarding calls to the tariff provider.
pub type TariffCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates the tariff-provider circuit breaker.
///
/// - **Failure threshold**: 5 consecutive failures open the circuit.
/// - **Backoff**: exponential from 10s to 60s before a trial call is let through.
///
/// While open, lookups are rejected without touching the network, so lead
/// creation degrades immediately instead of waiting on a dead provider.
pub fn create_tariff_circuit_breaker() -> TariffCircuitBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(policy).build()
}
