use std::time::{Duration, Instant};

use crate::constants::MAX_OTP_ATTEMPTS;

/// Ephemeral registration state held in the pending cache until the OTP is
/// verified, the attempt budget is spent, or the TTL lapses
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub request_id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub user_type: String,
    pub otp_code: String,
    pub attempts: u32,
    pub created_at: Instant,
    pub ttl: Duration,
}

/// Outcome of checking an OTP code against a pending registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpCheck {
    /// Code matched; the caller should promote the registration to a user row
    Verified,
    /// Code did not match; this many attempts remain
    Mismatch { remaining: u32 },
    /// Attempt budget already spent; the entry must be discarded
    Exhausted,
}

impl PendingRegistration {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    pub fn attempts_remaining(&self) -> u32 {
        MAX_OTP_ATTEMPTS.saturating_sub(self.attempts)
    }

    /// Check an OTP code, incrementing the attempt counter on mismatch.
    ///
    /// Once the budget is spent the counter stops moving and every further
    /// check reports `Exhausted`.
    pub fn check_otp(&mut self, code: &str) -> OtpCheck {
        if self.attempts >= MAX_OTP_ATTEMPTS {
            return OtpCheck::Exhausted;
        }
        if self.otp_code == code {
            return OtpCheck::Verified;
        }
        self.attempts += 1;
        if self.attempts >= MAX_OTP_ATTEMPTS {
            OtpCheck::Exhausted
        } else {
            OtpCheck::Mismatch {
                remaining: self.attempts_remaining(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingRegistration {
        PendingRegistration {
            request_id: "req-1".into(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$argon2id$stub".into(),
            user_type: "analyst".into(),
            otp_code: "123456".into(),
            attempts: 0,
            created_at: Instant::now(),
            ttl: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_correct_otp_verifies() {
        let mut p = pending();
        assert_eq!(p.check_otp("123456"), OtpCheck::Verified);
        assert_eq!(p.attempts, 0);
    }

    #[test]
    fn test_attempts_stop_at_three() {
        let mut p = pending();
        assert_eq!(p.check_otp("000000"), OtpCheck::Mismatch { remaining: 2 });
        assert_eq!(p.check_otp("000000"), OtpCheck::Mismatch { remaining: 1 });
        assert_eq!(p.check_otp("000000"), OtpCheck::Exhausted);
        // Counter no longer moves, even with the correct code
        assert_eq!(p.check_otp("123456"), OtpCheck::Exhausted);
        assert_eq!(p.attempts, 3);
    }

    #[test]
    fn test_expiry() {
        let mut p = pending();
        p.ttl = Duration::from_secs(0);
        assert!(p.is_expired(Instant::now()));
    }
}
