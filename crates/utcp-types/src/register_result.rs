use crate::call_template::CallTemplate;
use crate::manual::Manual;

/// Outcome of registering a manual.
///
/// On failure, `manual` is still a well-formed empty manual (see
/// [`Manual::empty`]) and `errors` is non-empty; `registerManual` never
/// throws for I/O or remote errors, only for malformed call templates.
#[derive(Debug, Clone)]
pub struct RegisterManualResult {
    pub manual_call_template: CallTemplate,
    pub manual: Manual,
    pub success: bool,
    pub errors: Vec<String>,
}

impl RegisterManualResult {
    pub fn success(manual_call_template: CallTemplate, manual: Manual) -> Self {
        Self {
            manual_call_template,
            manual,
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failure(manual_call_template: CallTemplate, errors: Vec<String>) -> Self {
        let name = manual_call_template.name().to_string();
        Self {
            manual_call_template,
            manual: Manual::empty(name),
            success: false,
            errors,
        }
    }
}
