//! Messaging gateway: registration lookups and text sends over the live
//! session.
//!
//! Every call re-reads the current handle from the [`SessionHolder`], so a
//! send racing a Disconnect fails with `NotConnected` instead of using a
//! torn-down client.

mod address;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{GatewayError, RemoteError};
use crate::remote::RemoteClient;
use crate::session::SessionHolder;

pub use address::AddressFormat;

/// Retry behavior for sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff unit; the wait after attempt `n` is `n * step`.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }
}

/// Registration status of a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub address: String,
    pub registered: bool,
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub address: String,
    /// Attempts used, 1 when the first try went through.
    pub attempts: u32,
}

pub struct MessagingGateway {
    holder: Arc<SessionHolder>,
    format: AddressFormat,
    retry: RetryPolicy,
}

impl MessagingGateway {
    pub fn new(holder: Arc<SessionHolder>, format: AddressFormat, retry: RetryPolicy) -> Self {
        Self {
            holder,
            format,
            retry,
        }
    }

    pub fn format(&self) -> &AddressFormat {
        &self.format
    }

    pub fn normalize(&self, raw: &str) -> Result<String, GatewayError> {
        self.format.normalize(raw)
    }

    /// Ask the network whether `raw` is a registered account.
    pub async fn check_registered(&self, raw: &str) -> Result<Registration, GatewayError> {
        let handle = self.connected_handle().await?;
        let address = self.format.normalize(raw)?;

        let entries = handle
            .lookup(std::slice::from_ref(&address))
            .await
            .map_err(GatewayError::LookupFailed)?;
        let registered = entries
            .iter()
            .any(|entry| entry.address == address && entry.registered);

        tracing::debug!(address = %address, registered, "Checked recipient registration");
        Ok(Registration {
            address,
            registered,
        })
    }

    /// Send a text message, retrying transient failures with linear backoff.
    ///
    /// Stops early with `NotConnected` when the session is gone or the error
    /// says the connection itself is down.
    pub async fn send(&self, raw: &str, body: &str) -> Result<SendReceipt, GatewayError> {
        self.connected_handle().await?;
        if raw.trim().is_empty() {
            return Err(GatewayError::InvalidInput { field: "to" });
        }
        if body.trim().is_empty() {
            return Err(GatewayError::InvalidInput { field: "message" });
        }
        let address = self.format.normalize(raw)?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = RemoteError::NotConnected;
        for attempt in 1..=max_attempts {
            let handle = self.connected_handle().await?;
            match handle.send(&address, body).await {
                Ok(()) => {
                    tracing::info!(address = %address, attempt, "Message sent");
                    return Ok(SendReceipt { address, attempts: attempt });
                }
                Err(e) if e.is_connection_down() => {
                    tracing::warn!(address = %address, error = %e, "Send aborted, connection is down");
                    return Err(GatewayError::NotConnected);
                }
                Err(e) => {
                    tracing::warn!(
                        address = %address,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Send attempt failed"
                    );
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        Err(GatewayError::SendFailed {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn connected_handle(&self) -> Result<Arc<dyn RemoteClient>, GatewayError> {
        match self.holder.current_handle().await {
            Some(handle) if handle.is_connected() => Ok(handle),
            _ => Err(GatewayError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::Instant;

    use crate::remote::ClientFactory;
    use crate::remote::scripted::{ScriptState, ScriptedFactory};
    use crate::session::ConnectionState;

    async fn connected_gateway() -> (MessagingGateway, Arc<ScriptState>) {
        let factory = ScriptedFactory::new();
        let script = factory.state();
        let client = factory.new_client(None).unwrap();
        client.connect().await.unwrap();

        let holder = Arc::new(SessionHolder::new());
        holder
            .mutate(|slot| {
                slot.transition(ConnectionState::Connected).unwrap();
                slot.handle = Some(client);
                slot.identity = Some("id-1".to_string());
            })
            .await;

        let gateway =
            MessagingGateway::new(holder, AddressFormat::default(), RetryPolicy::default());
        (gateway, script)
    }

    fn disconnected_gateway() -> MessagingGateway {
        MessagingGateway::new(
            Arc::new(SessionHolder::new()),
            AddressFormat::default(),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn test_retry_delays_are_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_send_succeeds_first_time_with_one_call() {
        let (gateway, script) = connected_gateway().await;

        let receipt = gateway.send("081234567890", "hello").await.unwrap();
        assert_eq!(receipt.address, "6281234567890@s.whatsapp.net");
        assert_eq!(receipt.attempts, 1);
        assert_eq!(ScriptState::count(&script.send_calls), 1);
        assert_eq!(
            script.sent.lock().unwrap().as_slice(),
            &[(
                "6281234567890@s.whatsapp.net".to_string(),
                "hello".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_send_not_connected_comes_before_input_validation() {
        let gateway = disconnected_gateway();
        assert!(matches!(
            gateway.send("", "").await.unwrap_err(),
            GatewayError::NotConnected
        ));
    }

    #[tokio::test]
    async fn test_send_rejects_blank_fields() {
        let (gateway, script) = connected_gateway().await;

        let err = gateway.send("  ", "hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput { field: "to" }));
        let err = gateway.send("0812", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput { field: "message" }));
        assert_eq!(ScriptState::count(&script.send_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retries_transient_failures_then_gives_up() {
        let (gateway, script) = connected_gateway().await;
        *script.sticky_send_error.lock().unwrap() =
            Some(RemoteError::Transient("server busy".to_string()));

        let started = Instant::now();
        let err = gateway.send("081234567890", "hello").await.unwrap_err();

        match err {
            GatewayError::SendFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, RemoteError::Transient(_)));
            }
            other => panic!("expected SendFailed, got {other:?}"),
        }
        assert_eq!(ScriptState::count(&script.send_calls), 3);
        // 1s after the first failure, 2s after the second.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_recovers_after_transient_failure() {
        let (gateway, script) = connected_gateway().await;
        script
            .send_errors
            .lock()
            .unwrap()
            .push_back(RemoteError::Transient("timeout".to_string()));

        let receipt = gateway.send("6281234567890", "hi").await.unwrap();
        assert_eq!(receipt.attempts, 2);
        assert_eq!(ScriptState::count(&script.send_calls), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_aborts_when_connection_is_down() {
        let (gateway, script) = connected_gateway().await;
        *script.sticky_send_error.lock().unwrap() =
            Some(RemoteError::ConnectionLost("socket closed".to_string()));

        let err = gateway.send("081234567890", "hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
        assert_eq!(ScriptState::count(&script.send_calls), 1);
    }

    #[tokio::test]
    async fn test_check_registered() {
        let (gateway, script) = connected_gateway().await;
        script
            .unregistered
            .lock()
            .unwrap()
            .push("6289999@s.whatsapp.net".to_string());

        let reg = gateway.check_registered("081234567890").await.unwrap();
        assert_eq!(
            reg,
            Registration {
                address: "6281234567890@s.whatsapp.net".to_string(),
                registered: true,
            }
        );

        let reg = gateway.check_registered("089999").await.unwrap();
        assert!(!reg.registered);
    }

    #[tokio::test]
    async fn test_check_registered_requires_connection() {
        let gateway = disconnected_gateway();
        assert!(matches!(
            gateway.check_registered("0812").await.unwrap_err(),
            GatewayError::NotConnected
        ));
    }

    #[tokio::test]
    async fn test_lookup_errors_propagate() {
        let (gateway, script) = connected_gateway().await;
        *script.lookup_error.lock().unwrap() = Some(RemoteError::Rejected("quota".to_string()));

        let err = gateway.check_registered("0812").await.unwrap_err();
        match err {
            GatewayError::LookupFailed(RemoteError::Rejected(msg)) => assert_eq!(msg, "quota"),
            other => panic!("expected LookupFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_after_handle_disconnects_is_not_connected() {
        let (gateway, _script) = connected_gateway().await;
        let handle = gateway.holder.current_handle().await.unwrap();
        handle.disconnect().await;

        let err = gateway.send("0812", "hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConnected));
    }
}
