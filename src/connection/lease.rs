//! Lease accounting for both roles.
//!
//! When the SETUP frame sets the lease flag, a requester may issue no
//! request until it holds a lease with remaining requests and an
//! unexpired TTL. Both sides enforce independently: the requester checks
//! before sending (clock skew is its own risk), the responder checks on
//! receipt and answers violations with ERROR(REJECTED).

use std::time::Duration;

use tokio::time::Instant;

use crate::error::Error;

#[derive(Clone, Copy, Debug)]
struct LeaseGrant {
    remaining: u32,
    deadline: Instant,
}

impl LeaseGrant {
    fn new(requests: u32, ttl: Duration) -> Self {
        Self { remaining: requests, deadline: Instant::now() + ttl }
    }

    fn try_use(&mut self) -> bool {
        if self.remaining == 0 || Instant::now() >= self.deadline {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Per-connection lease state for both directions.
#[derive(Debug)]
pub struct Leases {
    enabled: bool,
    granted_to_us: Option<LeaseGrant>,
    granted_by_us: Option<LeaseGrant>,
}

impl Leases {
    /// Create lease state; disabled leases admit everything.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled, granted_to_us: None, granted_by_us: None }
    }

    /// Whether lease semantics are active on this connection.
    #[must_use]
    pub const fn is_enabled(&self) -> bool { self.enabled }

    /// Enable or disable lease semantics (the server adopts the SETUP
    /// lease flag).
    pub const fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }

    /// Record a LEASE frame received from the peer.
    pub fn on_received(&mut self, ttl_ms: u32, requests: u32) {
        if self.enabled {
            log::debug!("lease received: {requests} requests within {ttl_ms}ms");
            self.granted_to_us = Some(LeaseGrant::new(requests, Duration::from_millis(ttl_ms.into())));
        }
    }

    /// Record a lease we are issuing to the peer.
    pub fn on_granted(&mut self, ttl: Duration, requests: u32) {
        if self.enabled {
            self.granted_by_us = Some(LeaseGrant::new(requests, ttl));
        }
    }

    /// Requester-side gate: consume one unit of our lease before sending
    /// a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] when leases are active and no valid
    /// grant covers the request. Enforcement happens before the frame is
    /// sent.
    pub fn check_outbound(&mut self) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        match self.granted_to_us.as_mut() {
            Some(grant) => {
                if grant.try_use() {
                    Ok(())
                } else {
                    Err(Error::rejected("lease exhausted or expired"))
                }
            }
            None => Err(Error::rejected("no lease received")),
        }
    }

    /// Responder-side gate: admit an inbound request against the lease we
    /// issued.
    #[must_use]
    pub fn admit_inbound(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        self.granted_by_us
            .as_mut()
            .is_some_and(LeaseGrant::try_use)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn disabled_leases_admit_everything() {
        let mut leases = Leases::new(false);
        assert!(leases.check_outbound().is_ok());
        assert!(leases.admit_inbound());
    }

    #[rstest]
    fn requests_are_rejected_before_any_lease_arrives() {
        let mut leases = Leases::new(true);
        assert!(matches!(leases.check_outbound(), Err(Error::Rejected(_))));
        assert!(!leases.admit_inbound());
    }

    #[rstest]
    fn grants_are_consumed_one_request_at_a_time() {
        let mut leases = Leases::new(true);
        leases.on_received(60_000, 2);
        assert!(leases.check_outbound().is_ok());
        assert!(leases.check_outbound().is_ok());
        assert!(matches!(leases.check_outbound(), Err(Error::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_grants_reject_locally() {
        let mut leases = Leases::new(true);
        leases.on_received(1_000, 5);
        assert!(leases.check_outbound().is_ok());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(matches!(leases.check_outbound(), Err(Error::Rejected(_))));
    }

    #[rstest]
    fn responder_enforcement_mirrors_the_grant() {
        let mut leases = Leases::new(true);
        leases.on_granted(Duration::from_secs(1), 1);
        assert!(leases.admit_inbound());
        assert!(!leases.admit_inbound());
    }
}
