use crate::backend::KeyScheme;
use crate::keystore::DEFAULT_NAMESPACE;
use crate::pow::PowConfig;

/// Settings a [`crate::KeyAuthority`] is constructed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAuthorityConfig {
    /// Scheme the authority is bound to for its whole lifetime
    pub scheme: KeyScheme,
    /// Selects which key files on disk belong to this authority
    pub app_id: Option<String>,
    /// Difficulty used when a fresh identity has to be generated
    pub difficulty: u32,
    /// Namespace passed to the directory resolver
    pub namespace: String,
    pub pow: PowConfig,
    /// Regenerate a stored identity whose difficulty is below `difficulty`
    pub enforce_difficulty_on_load: bool,
}

impl KeyAuthorityConfig {
    pub fn new(scheme: KeyScheme) -> Self {
        Self {
            scheme,
            app_id: None,
            difficulty: 0,
            namespace: DEFAULT_NAMESPACE.to_string(),
            pow: PowConfig::default(),
            enforce_difficulty_on_load: false,
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_pow(mut self, pow: PowConfig) -> Self {
        self.pow = pow;
        self
    }

    pub fn with_enforced_difficulty(mut self, enforce: bool) -> Self {
        self.enforce_difficulty_on_load = enforce;
        self
    }

    pub(crate) fn instance_label(&self) -> &str {
        self.app_id.as_deref().unwrap_or("default")
    }
}
