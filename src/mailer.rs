//! OTP mail delivery seam.
//!
//! Actual SMTP delivery is an external collaborator; the server only needs a
//! fire-and-forget dispatch point. `LogMailer` is the development
//! implementation and writes the code to the log instead of the wire.

use async_trait::async_trait;

/// Dispatches one-time passwords to users
#[async_trait]
pub trait OtpMailer: Send + Sync {
    /// Deliver an OTP. Failures are logged by callers, never propagated into
    /// the request path.
    async fn send_otp(
        &self,
        email: &str,
        otp_code: &str,
        purpose: &str,
        expires_in_secs: u64,
    ) -> anyhow::Result<()>;
}

/// Development mailer: records the dispatch in the log
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_otp(
        &self,
        email: &str,
        otp_code: &str,
        purpose: &str,
        expires_in_secs: u64,
    ) -> anyhow::Result<()> {
        tracing::info!(
            "OTP dispatch ({}): code {} for {} expires in {}s",
            purpose,
            otp_code,
            email,
            expires_in_secs
        );
        Ok(())
    }
}
