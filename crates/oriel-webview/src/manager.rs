//! Webview registration lifecycle.
//!
//! `WebviewManager` owns the registration table and keeps the two derived
//! views — the protocol provider's and the port-mapping provider's — in
//! sync. Every lifecycle operation funnels through one fan-out point
//! ([`WebviewManager::apply_to_providers`]), so the providers cannot observe
//! divergent metadata for the same webview.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use oriel_common::{WebviewError, WebviewId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metadata::{MetadataDelta, RegistrationDelta, RegistrationMetadata, WebviewRegistration};
use crate::permissions::permission_allowed;
use crate::port_mapping::WebviewPortMappingProvider;
use crate::protocol::{ResourceResponse, ResponseDetails, WebviewProtocolProvider};
use crate::services::{
    FileService, RequestService, SurfaceRegistry, TunnelService, WebviewSession, WindowRegistry,
};

/// Addressing for [`WebviewManager::set_ignore_menu_shortcuts`]: either the
/// owning window (resolved to its primary content surface) or a content
/// surface directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShortcutTarget {
    #[serde(rename_all = "camelCase")]
    Window { window_id: u32 },
    #[serde(rename_all = "camelCase")]
    Surface { surface_id: u32 },
}

enum ProviderOp<'a> {
    Register(&'a WebviewId, &'a WebviewRegistration),
    Update(&'a WebviewId, &'a RegistrationDelta),
    Unregister(&'a WebviewId),
}

pub struct WebviewManager {
    protocol_provider: Arc<WebviewProtocolProvider>,
    port_mapping_provider: Arc<WebviewPortMappingProvider>,
    windows: Arc<dyn WindowRegistry>,
    surfaces: Arc<dyn SurfaceRegistry>,
    registrations: Mutex<HashMap<WebviewId, WebviewRegistration>>,
}

impl WebviewManager {
    /// Build the manager, its two providers, and install the fixed
    /// permission policy on the shared session partition. The policy is
    /// installed once here and covers every current and future webview in
    /// the session.
    pub fn new(
        file_service: Arc<dyn FileService>,
        request_service: Arc<dyn RequestService>,
        tunnel_service: Arc<dyn TunnelService>,
        session: &dyn WebviewSession,
        windows: Arc<dyn WindowRegistry>,
        surfaces: Arc<dyn SurfaceRegistry>,
    ) -> Self {
        session.set_permission_request_handler(Box::new(permission_allowed));
        session.set_permission_check_handler(Box::new(permission_allowed));

        Self {
            protocol_provider: Arc::new(WebviewProtocolProvider::new(
                file_service,
                request_service,
            )),
            port_mapping_provider: Arc::new(WebviewPortMappingProvider::new(tunnel_service)),
            windows,
            surfaces,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Register a webview before its content starts loading. All URIs are
    /// normalized first; a malformed URI rejects the call and neither
    /// provider is touched. Registering an id that is already live
    /// replaces the previous registration in full.
    pub fn register_webview(
        &self,
        id: &WebviewId,
        window_id: u32,
        metadata: &RegistrationMetadata,
    ) -> Result<(), WebviewError> {
        let registration = metadata.normalize(window_id)?;

        let mut registrations = self.registrations.lock().unwrap();
        let replaced = registrations
            .insert(id.clone(), registration.clone())
            .is_some();
        self.apply_to_providers(ProviderOp::Register(id, &registration));
        debug!(webview_id = %id, window_id, replaced, "webview registered");
        Ok(())
    }

    /// Remove a registration. Unregistering an unknown id is a no-op.
    pub fn unregister_webview(&self, id: &WebviewId) {
        let mut registrations = self.registrations.lock().unwrap();
        if registrations.remove(id).is_none() {
            debug!(webview_id = %id, "unregister for unknown webview ignored");
            return;
        }
        self.apply_to_providers(ProviderOp::Unregister(id));
        debug!(webview_id = %id, "webview unregistered");
    }

    /// Apply a partial metadata update to a live registration. Fields
    /// absent from the delta stay untouched in both providers.
    pub fn update_webview_metadata(
        &self,
        id: &WebviewId,
        delta: &MetadataDelta,
    ) -> Result<(), WebviewError> {
        let normalized = delta.normalize()?;

        let mut registrations = self.registrations.lock().unwrap();
        let Some(registration) = registrations.get_mut(id) else {
            return Err(WebviewError::UnknownRegistration(id.clone()));
        };
        registration.apply(&normalized);
        self.apply_to_providers(ProviderOp::Update(id, &normalized));
        debug!(webview_id = %id, "webview metadata updated");
        Ok(())
    }

    /// Toggle menu-shortcut suppression on the targeted content surface.
    ///
    /// Fails if the target cannot be resolved to a live surface. A surface
    /// that is already torn down is a silent no-op; the setting is
    /// meaningless for destroyed content.
    pub fn set_ignore_menu_shortcuts(
        &self,
        target: ShortcutTarget,
        enabled: bool,
    ) -> Result<(), WebviewError> {
        let surface = match target {
            ShortcutTarget::Window { window_id } => self
                .windows
                .window(window_id)
                .and_then(|window| window.content_surface())
                .ok_or(WebviewError::InvalidWindow(window_id))?,
            ShortcutTarget::Surface { surface_id } => self
                .surfaces
                .surface(surface_id)
                .ok_or(WebviewError::InvalidSurface(surface_id))?,
        };

        if !surface.is_destroyed() {
            surface.set_ignore_menu_shortcuts(enabled);
        }
        Ok(())
    }

    /// Forward a terminal resource resolution to the protocol provider.
    /// Exactly one forward per resolution, no transformation, no retry.
    pub fn did_load_resource(
        &self,
        request_id: u64,
        response: ResourceResponse,
        details: Option<ResponseDetails>,
    ) {
        self.protocol_provider
            .did_load_resource(request_id, response, details);
    }

    /// The registration currently held for a webview, if any.
    pub fn registration(&self, id: &WebviewId) -> Option<WebviewRegistration> {
        self.registrations.lock().unwrap().get(id).cloned()
    }

    pub fn protocol_provider(&self) -> &Arc<WebviewProtocolProvider> {
        &self.protocol_provider
    }

    pub fn port_mapping_provider(&self) -> &Arc<WebviewPortMappingProvider> {
        &self.port_mapping_provider
    }

    /// Single fan-out point for provider state. Both providers are updated
    /// here and nowhere else, so a register/update/unregister can never
    /// leave them observing different metadata for one id.
    fn apply_to_providers(&self, op: ProviderOp<'_>) {
        match op {
            ProviderOp::Register(id, registration) => {
                self.protocol_provider.register_webview(id, registration);
                self.port_mapping_provider.register_webview(id, registration);
            }
            ProviderOp::Update(id, delta) => {
                self.protocol_provider.update_webview_metadata(id, delta);
                self.port_mapping_provider.update_webview_metadata(id, delta);
            }
            ProviderOp::Unregister(id) => {
                self.protocol_provider.unregister_webview(id);
                self.port_mapping_provider.unregister_webview(id);
            }
        }
    }
}
