// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Network binding information returned by `network-get`.

use serde::{Deserialize, Serialize};

/// One address on an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Hostname, if any.
    #[serde(default)]
    pub hostname: String,
    /// IP address.
    pub value: String,
    /// Subnet in CIDR notation.
    pub cidr: String,
}

/// An interface with its addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindAddress {
    /// Interface name.
    pub interface_name: String,
    /// Addresses on the interface.
    pub addresses: Vec<Address>,
    /// Hardware address.
    #[serde(default)]
    pub mac_address: Option<String>,
}

/// Resolved network configuration for a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Interfaces the binding listens on.
    pub bind_addresses: Vec<BindAddress>,
    /// Subnets traffic leaves from.
    pub egress_subnets: Vec<String>,
    /// Addresses remote units should connect to.
    pub ingress_addresses: Vec<String>,
}

impl Default for Network {
    fn default() -> Self {
        Self::with_address("192.0.2.0")
    }
}

impl Network {
    /// A single-interface network on `private_address`.
    pub fn with_address(private_address: impl Into<String>) -> Self {
        let private_address = private_address.into();
        Self {
            bind_addresses: vec![BindAddress {
                interface_name: "eth0".to_string(),
                addresses: vec![Address {
                    hostname: String::new(),
                    value: private_address.clone(),
                    cidr: format!("{private_address}/24"),
                }],
                mac_address: None,
            }],
            egress_subnets: vec![format!("{private_address}/32")],
            ingress_addresses: vec![private_address],
        }
    }

    /// First bound address.
    pub fn bind_address(&self) -> Option<&str> {
        self.bind_addresses
            .first()
            .and_then(|b| b.addresses.first())
            .map(|a| a.value.as_str())
    }

    /// First ingress address.
    pub fn ingress_address(&self) -> Option<&str> {
        self.ingress_addresses.first().map(String::as_str)
    }
}
