//! Webview registration metadata.
//!
//! The wire-facing types ([`RegistrationMetadata`], [`MetadataDelta`]) carry
//! URIs as raw strings, as handed over by the workbench layer. Normalization
//! into [`url::Url`] happens once, up front, before any provider sees the
//! registration; a single malformed URI rejects the whole call.

use oriel_common::WebviewError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Declared translation from a logical port referenced by webview content
/// to the port it actually lives on. Rule order matters: the first rule
/// matching a given webview port wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub webview_port: u16,
    pub extension_host_port: u16,
}

/// Resolved remote authority a webview's port mappings route through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnectionData {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_token: Option<String>,
}

/// Full metadata handed over when a webview is registered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationMetadata {
    /// Origin URI of the extension that owns the webview's content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_location: Option<String>,
    /// URI prefixes the webview may load local resources from.
    #[serde(default)]
    pub local_resource_roots: Vec<String>,
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_connection_data: Option<RemoteConnectionData>,
}

/// Partial metadata update. Absent fields are left untouched in both
/// providers; present fields atomically replace the previous value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_resource_roots: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_mappings: Option<Vec<PortMapping>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_connection_data: Option<RemoteConnectionData>,
}

/// A live registration, URIs normalized. One per registered webview.
#[derive(Debug, Clone, PartialEq)]
pub struct WebviewRegistration {
    /// Identifier of the owning application window.
    pub window_id: u32,
    pub extension_location: Option<Url>,
    pub local_resource_roots: Vec<Url>,
    pub port_mappings: Vec<PortMapping>,
    pub remote_connection_data: Option<RemoteConnectionData>,
}

/// [`MetadataDelta`] after URI normalization, ready for provider fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationDelta {
    pub extension_location: Option<Url>,
    pub local_resource_roots: Option<Vec<Url>>,
    pub port_mappings: Option<Vec<PortMapping>>,
    pub remote_connection_data: Option<RemoteConnectionData>,
}

fn parse_uri(raw: &str) -> Result<Url, WebviewError> {
    Url::parse(raw).map_err(|e| WebviewError::Normalization {
        uri: raw.to_string(),
        reason: e.to_string(),
    })
}

impl RegistrationMetadata {
    /// Normalize every URI in the metadata. Fails without side effects if
    /// any single URI is malformed.
    pub fn normalize(&self, window_id: u32) -> Result<WebviewRegistration, WebviewError> {
        let extension_location = self
            .extension_location
            .as_deref()
            .map(parse_uri)
            .transpose()?;
        let local_resource_roots = self
            .local_resource_roots
            .iter()
            .map(|raw| parse_uri(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WebviewRegistration {
            window_id,
            extension_location,
            local_resource_roots,
            port_mappings: self.port_mappings.clone(),
            remote_connection_data: self.remote_connection_data.clone(),
        })
    }
}

impl MetadataDelta {
    /// Normalize only the fields present in the delta.
    pub fn normalize(&self) -> Result<RegistrationDelta, WebviewError> {
        let extension_location = self
            .extension_location
            .as_deref()
            .map(parse_uri)
            .transpose()?;
        let local_resource_roots = self
            .local_resource_roots
            .as_ref()
            .map(|roots| {
                roots
                    .iter()
                    .map(|raw| parse_uri(raw))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(RegistrationDelta {
            extension_location,
            local_resource_roots,
            port_mappings: self.port_mappings.clone(),
            remote_connection_data: self.remote_connection_data.clone(),
        })
    }
}

impl WebviewRegistration {
    /// Merge a normalized delta into this registration.
    pub fn apply(&mut self, delta: &RegistrationDelta) {
        if let Some(loc) = &delta.extension_location {
            self.extension_location = Some(loc.clone());
        }
        if let Some(roots) = &delta.local_resource_roots {
            self.local_resource_roots = roots.clone();
        }
        if let Some(mappings) = &delta.port_mappings {
            self.port_mappings = mappings.clone();
        }
        if let Some(remote) = &delta.remote_connection_data {
            self.remote_connection_data = Some(remote.clone());
        }
    }
}
