//! SMS delivery abstractions.
//!
//! The challenge issuer hands the passcode to an [`SmsSender`] and treats any
//! error as "no challenge was issued". The sender decides how to deliver
//! (gateway API, SMPP, etc.) and returns `Ok`/`Err`; the default for local
//! dev is [`LogSmsSender`], which logs and returns `Ok(())`.

use anyhow::Result;
use tracing::info;

/// Delivery abstraction for one-time passcodes.
pub trait SmsSender: Send + Sync {
    /// Deliver `body` to `phone_number` (E.164) or return a transport error.
    fn send(&self, phone_number: &str, body: &str) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending a real SMS.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSmsSender;

impl SmsSender for LogSmsSender {
    fn send(&self, phone_number: &str, body: &str) -> Result<()> {
        info!(to = %phone_number, %body, "sms send stub");
        Ok(())
    }
}
