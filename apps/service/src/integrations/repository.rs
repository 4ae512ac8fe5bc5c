use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use super::models::{IntegrationConfig, IntegrationId, IntegrationType, InvalidIntegrationId};

const INTEGRATION_NAME_PATTERN: &str = r"^[a-zA-Z0-9_-]+$";

#[derive(Debug, Error)]
pub enum IntegrationConfigError {
    #[error(
        "Invalid integration name [{0}]. Integration names must be alphanumeric and can contain \
         underscores or hyphens only."
    )]
    InvalidName(String),
    #[error(
        "Duplicate integration configuration found for {0}. Please ensure each integration has a \
         unique name."
    )]
    Duplicate(IntegrationId),
    #[error(transparent)]
    InvalidId(#[from] InvalidIntegrationId),
    #[error("Non-existing integration ID found: {0}.")]
    NonExisting(IntegrationId),
    #[error("Integration name pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Boot-time validated registry of notification channel instances.
///
/// All derived views are computed once in [`IntegrationRepository::new`], the
/// configuration is immutable for the lifetime of the process.
#[derive(Debug, Default)]
pub struct IntegrationRepository {
    configured: BTreeMap<IntegrationId, IntegrationConfig>,
    enabled: BTreeMap<IntegrationId, IntegrationConfig>,
    enabled_by_type: HashMap<IntegrationType, Vec<IntegrationConfig>>,
    globally_enabled_by_type: HashMap<IntegrationType, Vec<IntegrationConfig>>,
}

impl IntegrationRepository {
    /// Validate the configured integrations and build the lookup views.
    ///
    /// `smtp_configured` gates email integrations: without a mail transport
    /// they stay configured but are never enabled.
    pub fn new(
        configs: Vec<IntegrationConfig>,
        smtp_configured: bool,
    ) -> Result<Self, IntegrationConfigError> {
        let name_pattern = Regex::new(INTEGRATION_NAME_PATTERN)?;

        let mut configured = BTreeMap::new();
        for config in configs {
            if !name_pattern.is_match(config.name()) {
                return Err(IntegrationConfigError::InvalidName(config.name().to_string()));
            }
            let id = config.id();
            if configured.contains_key(&id) {
                return Err(IntegrationConfigError::Duplicate(id));
            }
            configured.insert(id, config);
        }

        let mut enabled = BTreeMap::new();
        for (id, config) in &configured {
            match config {
                IntegrationConfig::Email(_) if !(config.enabled() && smtp_configured) => {
                    warn!(
                        integration = %id,
                        "Skipping email integration because it's either disabled or SMTP config is not available"
                    );
                }
                _ if config.enabled() => {
                    enabled.insert(id.clone(), config.clone());
                }
                _ => {}
            }
        }

        let mut enabled_by_type: HashMap<IntegrationType, Vec<IntegrationConfig>> = HashMap::new();
        for config in enabled.values() {
            enabled_by_type.entry(config.integration_type()).or_default().push(config.clone());
        }

        let globally_enabled_by_type = enabled_by_type
            .iter()
            .map(|(integration_type, configs)| {
                let globals = configs.iter().filter(|c| c.global()).cloned().collect();
                (*integration_type, globals)
            })
            .collect();

        let repository = Self { configured, enabled, enabled_by_type, globally_enabled_by_type };
        repository.log_summary();
        Ok(repository)
    }

    fn log_summary(&self) {
        let join = |ids: Vec<&IntegrationId>| {
            ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        info!("Configured integrations: [{}]", join(self.configured.keys().collect()));
        info!("Enabled integrations: [{}]", join(self.enabled.keys().collect()));
        info!(
            "Globally enabled integrations: [{}]",
            join(self.enabled.iter().filter(|(_, c)| c.global()).map(|(id, _)| id).collect())
        );
    }

    pub fn configured_integrations(&self) -> &BTreeMap<IntegrationId, IntegrationConfig> {
        &self.configured
    }

    pub fn enabled_integrations(&self) -> &BTreeMap<IntegrationId, IntegrationConfig> {
        &self.enabled
    }

    pub fn enabled_integrations_by_type(&self, integration_type: IntegrationType) -> &[IntegrationConfig] {
        self.enabled_by_type.get(&integration_type).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn globally_enabled_integrations_by_type(
        &self,
        integration_type: IntegrationType,
    ) -> &[IntegrationConfig] {
        self.globally_enabled_by_type.get(&integration_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// True when at least one integration of this type can send
    pub fn has_enabled(&self, integration_type: IntegrationType) -> bool {
        !self.enabled_integrations_by_type(integration_type).is_empty()
    }

    /// Effective channel set for a monitor: its explicit ids that are enabled
    /// and of `integration_type`, plus every global integration of that type.
    /// Each integration appears once.
    pub fn get_enabled_integrations<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a IntegrationId>,
        integration_type: IntegrationType,
    ) -> Vec<IntegrationConfig> {
        let mut resolved: BTreeMap<IntegrationId, IntegrationConfig> = ids
            .into_iter()
            .filter(|id| id.integration_type == integration_type)
            .filter_map(|id| self.enabled.get(id).map(|config| (id.clone(), config.clone())))
            .collect();

        for config in self.globally_enabled_integrations_by_type(integration_type) {
            resolved.entry(config.id()).or_insert_with(|| config.clone());
        }

        resolved.into_values().collect()
    }

    /// Parse raw `type:name` ids and require each one to be configured
    pub fn validate_integration_ids<S: AsRef<str>>(
        &self,
        raw_ids: &[S],
    ) -> Result<BTreeSet<IntegrationId>, IntegrationConfigError> {
        raw_ids
            .iter()
            .map(|raw| {
                let id: IntegrationId = raw.as_ref().parse()?;
                if self.configured.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(IntegrationConfigError::NonExisting(id))
                }
            })
            .collect()
    }

    /// Keep only the ids that belong to a configured integration
    pub fn retain_configured(&self, ids: &BTreeSet<IntegrationId>) -> BTreeSet<IntegrationId> {
        ids.iter().filter(|id| self.configured.contains_key(*id)).cloned().collect()
    }
}
