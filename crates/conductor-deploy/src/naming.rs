//! Physical names derived from the deploy specification.

/// Physical name of a unit: `<project>-<environment>-<unit>`.
#[must_use]
pub fn physical_name(project: &str, environment: &str, unit: &str) -> String {
    format!("{project}-{environment}-{unit}")
}

/// Name of the stack holding every unit of a project in one environment.
#[must_use]
pub fn stack_name(project: &str, environment: &str) -> String {
    format!("{project}-{environment}")
}

/// Environment variable through which a consumer learns a supplier's
/// physical name: `CONDUCTOR_<LOGICAL_NAME>`.
#[must_use]
pub fn environment_variable(logical_name: &str) -> String {
    let suffix: String = logical_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("CONDUCTOR_{suffix}")
}
