//! Network interface enumeration

use pnet_datalink::{self, NetworkInterface};
use std::fmt;
use std::net::IpAddr;

use pcapbridge_core::{Error, Result};

/// Information about a network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Interface name, usable as a capture device
    pub name: String,
    /// Human-readable description (may be empty)
    pub description: String,
    /// OS interface index
    pub index: u32,
    /// MAC address if available
    pub mac: Option<String>,
    /// Addresses assigned to this interface
    pub ips: Vec<IpAddr>,
    /// Whether the interface is up
    pub is_up: bool,
    /// Whether the interface is a loopback
    pub is_loopback: bool,
}

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        Self {
            name: iface.name.clone(),
            description: iface.description.clone(),
            index: iface.index,
            mac: iface.mac.map(|mac| mac.to_string()),
            ips: iface.ips.iter().map(|network| network.ip()).collect(),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
        }
    }
}

impl InterfaceInfo {
    /// Up interfaces can be opened for live capture
    pub fn is_capture_capable(&self) -> bool {
        self.is_up
    }

    /// Candidate for the default capture device
    fn is_default_candidate(&self) -> bool {
        self.is_up && !self.is_loopback && !self.ips.is_empty()
    }
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(mac) = &self.mac {
            write!(f, " [{}]", mac)?;
        }
        let flags = match (self.is_up, self.is_loopback) {
            (true, true) => "up, loopback",
            (true, false) => "up",
            (false, true) => "down, loopback",
            (false, false) => "down",
        };
        write!(f, " ({})", flags)?;
        for ip in &self.ips {
            write!(f, " {}", ip)?;
        }
        Ok(())
    }
}

/// List all network interfaces
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    let interfaces = pnet_datalink::interfaces();

    if interfaces.is_empty() {
        return Err(Error::capture(
            "No network interfaces found. Are you running with sufficient privileges?",
        ));
    }

    Ok(interfaces.iter().map(InterfaceInfo::from).collect())
}

/// Get information about a specific interface by name
pub fn get_interface(name: &str) -> Result<InterfaceInfo> {
    pnet_datalink::interfaces()
        .iter()
        .find(|iface| iface.name == name)
        .map(InterfaceInfo::from)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

/// First up, non-loopback interface with an address
pub fn default_interface() -> Result<InterfaceInfo> {
    list_interfaces()?
        .into_iter()
        .find(InterfaceInfo::is_default_candidate)
        .ok_or_else(|| Error::capture("No suitable default interface found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_interfaces() {
        let interfaces = list_interfaces().unwrap();
        assert!(!interfaces.is_empty());
        assert!(interfaces.iter().all(|iface| !iface.name.is_empty()));
    }

    #[test]
    fn test_loopback_interface() {
        let interfaces = list_interfaces().unwrap();
        let loopback = interfaces.iter().find(|iface| iface.is_loopback);
        assert!(loopback.is_some());
    }

    #[test]
    fn test_get_nonexistent_interface() {
        match get_interface("nonexistent_interface_xyz") {
            Err(Error::InterfaceNotFound(name)) => assert_eq!(name, "nonexistent_interface_xyz"),
            other => panic!("Expected InterfaceNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_candidate_rules() {
        let mut iface = InterfaceInfo {
            name: "eth0".to_string(),
            description: String::new(),
            index: 2,
            mac: Some("00:11:22:33:44:55".to_string()),
            ips: vec!["192.0.2.10".parse().unwrap()],
            is_up: true,
            is_loopback: false,
        };
        assert!(iface.is_default_candidate());
        assert_eq!(
            iface.to_string(),
            "eth0 [00:11:22:33:44:55] (up) 192.0.2.10"
        );

        iface.is_loopback = true;
        assert!(!iface.is_default_candidate());
        assert!(iface.is_capture_capable());

        iface.is_up = false;
        assert!(!iface.is_capture_capable());
    }
}
