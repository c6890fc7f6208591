//! Subscriber records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a subscriber connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Pppoe,
    Hotspot,
    StaticIp,
}

impl ServiceType {
    /// Wire name of the service type
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Pppoe => "pppoe",
            ServiceType::Hotspot => "hotspot",
            ServiceType::StaticIp => "static_ip",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

/// A subscriber as stored in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub name: String,
    pub username: String,
    pub service_type: ServiceType,
    pub pppoe_username: Option<String>,
    pub assigned_ip: Option<String>,
    pub static_ip: Option<String>,
    pub mac_address: Option<String>,
    pub status: SubscriberStatus,
    pub last_online: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// A PPPoE subscriber with no session data
    pub fn pppoe(
        id: impl Into<String>,
        name: impl Into<String>,
        pppoe_username: impl Into<String>,
    ) -> Self {
        let pppoe_username = pppoe_username.into();
        Self {
            id: id.into(),
            name: name.into(),
            username: pppoe_username.clone(),
            service_type: ServiceType::Pppoe,
            pppoe_username: Some(pppoe_username),
            assigned_ip: None,
            static_ip: None,
            mac_address: None,
            status: SubscriberStatus::Active,
            last_online: None,
        }
    }

    /// PPPoE username, `None` when unset or blank
    pub fn pppoe_username(&self) -> Option<&str> {
        self.pppoe_username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Address to probe for this subscriber's connection
    ///
    /// pppoe: assigned IP, then static IP. hotspot: assigned IP.
    /// static_ip: static IP.
    pub fn probe_address(&self) -> Option<&str> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|s| !s.is_empty())
        }

        match self.service_type {
            ServiceType::Pppoe => non_empty(&self.assigned_ip).or_else(|| non_empty(&self.static_ip)),
            ServiceType::Hotspot => non_empty(&self.assigned_ip),
            ServiceType::StaticIp => non_empty(&self.static_ip),
        }
    }
}
