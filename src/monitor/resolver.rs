//! Subscriber to interface resolution

use crate::device::{find_active_interface, Device};
use crate::directory::Subscriber;

use super::SubscribeError;

/// Find the running interface that carries a subscriber's traffic
pub(crate) async fn resolve_interface(
    device: &dyn Device,
    subscriber: &Subscriber,
) -> Result<String, SubscribeError> {
    let username = subscriber.pppoe_username().ok_or_else(|| {
        SubscribeError::ResolutionFailed(format!(
            "subscriber {} has no PPPoE username configured",
            subscriber.id
        ))
    })?;

    match find_active_interface(device, username).await {
        Ok(Some(interface)) => {
            tracing::debug!(
                resource = %subscriber.id,
                username = %username,
                interface = %interface,
                "Resolved active interface"
            );
            Ok(interface)
        }
        Ok(None) => Err(SubscribeError::NoActiveSession(username.to_string())),
        Err(e) => Err(SubscribeError::ResolutionFailed(format!(
            "failed to query device interfaces: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;

    #[tokio::test]
    async fn test_resolve_running_session() {
        let device = MockDevice::new().with_interfaces(["<pppoe-Alice>"]);
        let subscriber = Subscriber::pppoe("c1", "Alice", "alice");

        assert_eq!(
            resolve_interface(&device, &subscriber).await.unwrap(),
            "<pppoe-Alice>"
        );
    }

    #[tokio::test]
    async fn test_no_running_session() {
        let device = MockDevice::new().with_interfaces(["<pppoe-bob>"]);
        let subscriber = Subscriber::pppoe("c1", "Alice", "alice");

        assert_eq!(
            resolve_interface(&device, &subscriber).await,
            Err(SubscribeError::NoActiveSession("alice".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_username_and_device_failure() {
        let device = MockDevice::new().with_execute_error("read tcp: broken pipe");
        let mut subscriber = Subscriber::pppoe("c1", "Alice", "alice");

        let result = resolve_interface(&device, &subscriber).await;
        assert!(matches!(result, Err(SubscribeError::ResolutionFailed(m)) if m.contains("broken pipe")));

        subscriber.pppoe_username = None;
        let result = resolve_interface(&device, &subscriber).await;
        assert!(matches!(result, Err(SubscribeError::ResolutionFailed(m)) if m.contains("no PPPoE username")));
        assert_eq!(device.executed().len(), 1);
    }
}
