//! Read-only binding for validators.
//!
//! Validators police generated artifacts and must never mutate them. Every
//! validator the orchestrator obtains goes through [`bind_validator`], which
//! checks its declared model class and pins its tool set to [`ToolProfile::read_only`].

use std::sync::Arc;

use vigil_types::{Result, VigilError};

use crate::profiles::ValidatorRequirement;
use crate::validator::{CheckReport, CheckTask, Restrictions, Validator, ValidatorDescriptor};

/// Tools that can change the workspace.
pub const MUTATING_TOOLS: &[&str] = &["write_file", "edit_file", "shell"];

/// A named set of tools a capability may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolProfile {
    pub name: String,
    pub tools: Vec<String>,
}

impl ToolProfile {
    /// Inspection-only tools.
    pub fn read_only() -> Self {
        Self {
            name: "read_only".into(),
            tools: vec!["read_file".into(), "grep".into(), "glob".into()],
        }
    }

    pub fn allows(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

/// A validator pinned to the read-only tool profile.
pub struct BoundValidator {
    inner: Arc<dyn Validator>,
    descriptor: ValidatorDescriptor,
    profile: ToolProfile,
}

impl std::fmt::Debug for BoundValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundValidator")
            .field("descriptor", &self.descriptor)
            .field("profile", &self.profile)
            .finish()
    }
}

impl BoundValidator {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The descriptor with its tool list replaced by the read-only set.
    pub fn descriptor(&self) -> &ValidatorDescriptor {
        &self.descriptor
    }

    /// Run a check with the allowed tools and restrictions overwritten.
    pub async fn run_check(&self, task: &CheckTask) -> Result<CheckReport> {
        let mut task = task.clone();
        task.allowed_tools = self.profile.tools.clone();
        task.restrictions = Restrictions::analysis_only();
        self.inner.run_check(&task).await
    }
}

/// Verify that `validator` satisfies `requirement` and restrict it to read-only tools.
///
/// Fails with [`VigilError::UnsafeValidator`] if the declared model does not
/// belong to the required model class.
pub fn bind_validator(
    requirement: &ValidatorRequirement,
    validator: Arc<dyn Validator>,
) -> Result<BoundValidator> {
    let declared = validator.descriptor();
    if !declared.model.contains(&requirement.model_class) {
        return Err(VigilError::UnsafeValidator {
            validator: declared.name,
            reason: format!(
                "model '{}' is not a '{}' model required by '{}'",
                declared.model, requirement.model_class, requirement.name
            ),
        });
    }

    let profile = ToolProfile::read_only();
    let stripped: Vec<&str> = declared
        .tools
        .iter()
        .map(String::as_str)
        .filter(|tool| !profile.allows(tool))
        .collect();
    if !stripped.is_empty() {
        let mutating = stripped.iter().filter(|t| MUTATING_TOOLS.contains(*t)).count();
        tracing::warn!(
            validator = %declared.name,
            stripped = ?stripped,
            mutating,
            "Stripped tools from validator"
        );
    }
    tracing::debug!(validator = %declared.name, tools = ?profile.tools, "Read-only safeguards applied");

    let descriptor = ValidatorDescriptor {
        tools: profile.tools.clone(),
        ..declared
    };
    Ok(BoundValidator {
        inner: validator,
        descriptor,
        profile,
    })
}
