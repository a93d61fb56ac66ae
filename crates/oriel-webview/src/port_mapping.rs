//! Logical port mapping for webview content.
//!
//! Webview content may reference development-server ports that do not exist
//! where the content actually runs. `WebviewPortMappingProvider` holds each
//! webview's declared mapping rules and rewrites matching localhost URIs —
//! directly when the target is local, or through an opened tunnel when the
//! registration carries remote connection data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use oriel_common::WebviewId;
use tracing::{debug, warn};
use url::Url;

use crate::metadata::{PortMapping, RegistrationDelta, RemoteConnectionData, WebviewRegistration};
use crate::services::{TunnelAddress, TunnelService};

struct PortMappingEntry {
    mappings: Vec<PortMapping>,
    remote: Option<RemoteConnectionData>,
    /// Tunnel endpoints already opened for this webview, by webview port.
    tunnels: HashMap<u16, TunnelAddress>,
}

pub struct WebviewPortMappingProvider {
    tunnel_service: Arc<dyn TunnelService>,
    webviews: Mutex<HashMap<WebviewId, PortMappingEntry>>,
}

impl WebviewPortMappingProvider {
    pub fn new(tunnel_service: Arc<dyn TunnelService>) -> Self {
        Self {
            tunnel_service,
            webviews: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_webview(&self, id: &WebviewId, registration: &WebviewRegistration) {
        let mut webviews = self.webviews.lock().unwrap();
        webviews.insert(
            id.clone(),
            PortMappingEntry {
                mappings: registration.port_mappings.clone(),
                remote: registration.remote_connection_data.clone(),
                tunnels: HashMap::new(),
            },
        );
        debug!(webview_id = %id, "port mappings registered");
    }

    /// Drop the webview's mappings and any tunnel endpoints cached for it.
    pub fn unregister_webview(&self, id: &WebviewId) {
        self.webviews.lock().unwrap().remove(id);
        debug!(webview_id = %id, "port mappings unregistered");
    }

    pub fn update_webview_metadata(&self, id: &WebviewId, delta: &RegistrationDelta) {
        let mut webviews = self.webviews.lock().unwrap();
        if let Some(entry) = webviews.get_mut(id) {
            if let Some(mappings) = &delta.port_mappings {
                entry.mappings = mappings.clone();
                entry.tunnels.clear();
            }
            if let Some(remote) = &delta.remote_connection_data {
                entry.remote = Some(remote.clone());
                entry.tunnels.clear();
            }
        }
    }

    /// The mapping rules currently held for a webview, if registered.
    pub fn mappings(&self, id: &WebviewId) -> Option<Vec<PortMapping>> {
        self.webviews
            .lock()
            .unwrap()
            .get(id)
            .map(|entry| entry.mappings.clone())
    }

    /// Rewrite a localhost URI according to the webview's mapping rules.
    ///
    /// Returns the redirected URI, or `None` when no rule applies (or the
    /// matched rule is an identity mapping). The first rule matching the
    /// URI's port wins, in declaration order.
    pub async fn redirect(&self, id: &WebviewId, uri: &Url) -> Option<Url> {
        if !matches!(uri.host_str(), Some("localhost") | Some("127.0.0.1")) {
            return None;
        }
        let port = uri.port()?;

        let (mapping, remote, cached) = {
            let webviews = self.webviews.lock().unwrap();
            let entry = webviews.get(id)?;
            let mapping = *entry
                .mappings
                .iter()
                .find(|m| m.webview_port == port)?;
            (
                mapping,
                entry.remote.clone(),
                entry.tunnels.get(&port).cloned(),
            )
        };

        match remote {
            Some(remote) => {
                let address = match cached {
                    Some(address) => address,
                    None => {
                        let address = match self
                            .tunnel_service
                            .open_tunnel(&remote, mapping.extension_host_port)
                            .await
                        {
                            Ok(address) => address,
                            Err(e) => {
                                warn!(webview_id = %id, port, error = %e, "tunnel open failed");
                                return None;
                            }
                        };
                        // The webview may have gone away during the await;
                        // only cache if it is still registered.
                        let mut webviews = self.webviews.lock().unwrap();
                        if let Some(entry) = webviews.get_mut(id) {
                            entry.tunnels.insert(port, address.clone());
                        }
                        address
                    }
                };
                rewrite(uri, &address.host, address.port)
            }
            None if mapping.webview_port != mapping.extension_host_port => {
                let host = uri.host_str()?.to_string();
                rewrite(uri, &host, mapping.extension_host_port)
            }
            None => None,
        }
    }
}

fn rewrite(uri: &Url, host: &str, port: u16) -> Option<Url> {
    let mut redirected = uri.clone();
    redirected.set_host(Some(host)).ok()?;
    redirected.set_port(Some(port)).ok()?;
    Some(redirected)
}
