use std::collections::BTreeSet;

use crate::profile::Variant;
use crate::server_files::{parse_properties, ServerLayout};

/// Provisioning checklist, recomputed from presence checks and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningState {
    pub dependencies_installed: BTreeSet<String>,
    pub server_binary_present: bool,
    pub license_accepted: bool,
    pub properties_written: bool,
}

impl ProvisioningState {
    /// Inspects the server directory. Dependencies are filled in separately.
    pub fn inspect(layout: &ServerLayout, variant: Variant) -> Self {
        let server_binary_present = std::fs::metadata(layout.jar_path(variant))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);

        let license_accepted = std::fs::read_to_string(layout.eula_path())
            .map(|text| {
                parse_properties(&text)
                    .get("eula")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        let properties_written = std::fs::metadata(layout.properties_path())
            .map(|m| m.is_file())
            .unwrap_or(false);

        Self {
            dependencies_installed: BTreeSet::new(),
            server_binary_present,
            license_accepted,
            properties_written,
        }
    }

    pub fn with_dependencies(mut self, installed: BTreeSet<String>) -> Self {
        self.dependencies_installed = installed;
        self
    }

    pub fn config_written(&self) -> bool {
        self.license_accepted && self.properties_written
    }

    /// Everything on disk that the game server needs to start.
    pub fn server_ready(&self) -> bool {
        self.server_binary_present && self.config_written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_files::ServerConfigWriter;
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let state = ProvisioningState::inspect(&ServerLayout::new(dir.path()), Variant::Vanilla);
        assert!(!state.server_binary_present);
        assert!(!state.config_written());
        assert!(!state.server_ready());
    }

    #[test]
    fn test_fully_prepared_directory() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ServerLayout::new(dir.path());
        std::fs::write(layout.jar_path(Variant::Paper), b"jar").unwrap();
        let writer = ServerConfigWriter::new();
        writer.write_license_acceptance(&layout.eula_path()).unwrap();
        writer
            .write_properties(&layout.properties_path(), &BTreeMap::new())
            .unwrap();

        let state = ProvisioningState::inspect(&layout, Variant::Paper);
        assert!(state.server_ready());

        // Jar for a different variant is not there.
        assert!(!ProvisioningState::inspect(&layout, Variant::Vanilla).server_binary_present);
    }

    #[test]
    fn test_declined_license_is_not_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ServerLayout::new(dir.path());
        std::fs::write(layout.eula_path(), "#By changing the setting below to TRUE...\neula=false\n")
            .unwrap();
        assert!(!ProvisioningState::inspect(&layout, Variant::Vanilla).license_accepted);
    }
}
