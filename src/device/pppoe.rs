//! PPPoE session discovery
//!
//! Running PPPoE server sessions appear as dynamic `pppoe-in` interfaces
//! named `<pppoe-USERNAME>`.

use crate::protocol::Command;

use super::error::DeviceError;
use super::Device;

const PPPOE_PREFIX: &str = "<pppoe-";
const PPPOE_SUFFIX: &str = ">";

/// Names of all running `pppoe-in` interfaces
pub async fn active_pppoe_interfaces(device: &dyn Device) -> Result<Vec<String>, DeviceError> {
    let command = Command::new("/interface/print")
        .query("type=pppoe-in")
        .query("running=yes")
        .proplist(&["name"]);

    let reply = device.execute(command).await?;

    Ok(reply
        .re
        .iter()
        .filter_map(|item| item.non_empty("name"))
        .map(str::to_string)
        .collect())
}

/// Username part of a `<pppoe-USERNAME>` interface name
pub fn extract_pppoe_username(interface: &str) -> Option<&str> {
    interface
        .strip_prefix(PPPOE_PREFIX)
        .and_then(|rest| rest.strip_suffix(PPPOE_SUFFIX))
        .filter(|user| !user.is_empty())
}

/// Find the running interface for a PPPoE username
///
/// Comparison ignores case and surrounding whitespace.
pub async fn find_active_interface(
    device: &dyn Device,
    username: &str,
) -> Result<Option<String>, DeviceError> {
    let wanted = username.trim().to_lowercase();
    let interfaces = active_pppoe_interfaces(device).await?;

    Ok(interfaces.into_iter().find(|name| {
        extract_pppoe_username(name)
            .map(|user| user.trim().to_lowercase() == wanted)
            .unwrap_or(false)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;

    #[test]
    fn test_extract_username() {
        assert_eq!(extract_pppoe_username("<pppoe-alice>"), Some("alice"));
        assert_eq!(extract_pppoe_username("<pppoe-a.b@isp>"), Some("a.b@isp"));
        assert_eq!(extract_pppoe_username("<pppoe->"), None);
        assert_eq!(extract_pppoe_username("pppoe-alice"), None);
        assert_eq!(extract_pppoe_username("<pppoe-alice"), None);
        assert_eq!(extract_pppoe_username("ether1"), None);
    }

    #[tokio::test]
    async fn test_find_active_interface_ignores_case_and_whitespace() {
        let device = MockDevice::new().with_interfaces(["<pppoe-bob>", "<pppoe-Alice>"]);

        let found = find_active_interface(&device, "  alice ").await.unwrap();
        assert_eq!(found.as_deref(), Some("<pppoe-Alice>"));

        let missing = find_active_interface(&device, "carol").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_interface_query_words() {
        let device = MockDevice::new().with_interfaces(["<pppoe-bob>"]);
        active_pppoe_interfaces(&device).await.unwrap();

        let commands = device.executed();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].path(), "/interface/print");
        assert!(commands[0].args().contains(&"?type=pppoe-in".to_string()));
        assert!(commands[0].args().contains(&"?running=yes".to_string()));
    }
}
