//! The deploy specification produced by evaluating the user's configuration.
//!
//! ```json
//! {
//!   "project": "shop",
//!   "units": [
//!     {"name": "api", "entry_point": "index.js",
//!      "resource": {"type": "function", "properties": {"memory": 256}}},
//!     {"name": "orders", "resource": {"type": "table"}}
//!   ],
//!   "targets": [{"name": "prod", "region": "eu-west-1", "environment": "prod"}],
//!   "wiring": [{"consumer": "api", "logical_name": "orders", "supplier": "orders",
//!               "policy": [{"actions": ["table:Get", "table:Put"]}]}]
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use conductor_build::WiringTarget;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DeployError, DeployResult};
use crate::naming::{environment_variable, physical_name};

/// A whole deploy specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    /// Project name, the first component of every physical name.
    pub project: String,

    /// Units to deploy.
    #[serde(default)]
    pub units: Vec<UnitSpec>,

    /// Deployment targets.
    #[serde(default)]
    pub targets: Vec<TargetSpec>,

    /// Wiring edges between units.
    #[serde(default)]
    pub wiring: Vec<WiringSpec>,

    /// Directory relative unit roots are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// One unit of the specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Unit name, unique within the project.
    pub name: String,

    /// Source directory. Defaults to a directory named after the unit.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Entry point relative to `root_dir`. Units without one (or with an
    /// empty one) carry no code.
    #[serde(default)]
    pub entry_point: Option<String>,

    /// Prefix for every path in the unit's archive.
    #[serde(default)]
    pub path_prefix: String,

    /// Infrastructure resource definition.
    pub resource: ResourceSpec,
}

/// Resource definition of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Provider resource type.
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Provider properties, passed through untouched.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A named region/environment pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target name.
    pub name: String,
    /// Region.
    pub region: String,
    /// Environment, the second component of every physical name.
    pub environment: String,
}

/// A dependency edge from consumer to supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringSpec {
    /// Unit that uses the supplier.
    pub consumer: String,
    /// Name under which the consumer refers to the supplier.
    pub logical_name: String,
    /// Unit being used.
    pub supplier: String,
    /// Permissions the consumer needs on the supplier.
    #[serde(default)]
    pub policy: Vec<PolicyStatement>,
}

/// A permission statement granted to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// `Allow` or `Deny`.
    #[serde(default = "default_effect")]
    pub effect: String,
    /// Actions covered by the statement.
    pub actions: Vec<String>,
    /// Resources covered. Empty means the supplier itself.
    #[serde(default)]
    pub resources: Vec<String>,
}

fn default_effect() -> String {
    "Allow".to_owned()
}

impl UnitSpec {
    /// Whether the unit has code to package.
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.entry_point
            .as_deref()
            .is_some_and(|entry| !entry.trim().is_empty())
    }
}

impl DeploySpec {
    /// Read a specification from a `.json` or `.toml` file and validate it.
    ///
    /// Unit roots are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> DeployResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DeployError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        let mut spec: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&raw).map_err(|e| {
                DeployError::configuration(format!("invalid {}: {e}", path.display()))
            })?,
            _ => serde_json::from_str(&raw).map_err(|e| {
                DeployError::configuration(format!("invalid {}: {e}", path.display()))
            })?,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
            _ => PathBuf::from("."),
        };
        spec.base_dir = std::fs::canonicalize(&dir).map_err(|e| {
            DeployError::configuration(format!("cannot resolve {}: {e}", dir.display()))
        })?;

        spec.validate()?;
        Ok(spec)
    }

    /// Check names and wiring before anything touches the network.
    pub fn validate(&self) -> DeployResult<()> {
        if self.project.trim().is_empty() {
            return Err(DeployError::configuration("project name is empty"));
        }

        let mut units = HashSet::new();
        for unit in &self.units {
            if unit.name.trim().is_empty() {
                return Err(DeployError::configuration("unit with empty name"));
            }
            if !units.insert(unit.name.as_str()) {
                return Err(DeployError::configuration(format!(
                    "duplicate unit name: {}",
                    unit.name
                )));
            }
        }

        let mut targets = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(DeployError::configuration("target with empty name"));
            }
            if !targets.insert(target.name.as_str()) {
                return Err(DeployError::configuration(format!(
                    "duplicate target name: {}",
                    target.name
                )));
            }
        }

        let mut variables: HashMap<(&str, String), &str> = HashMap::new();
        for edge in &self.wiring {
            for end in [&edge.consumer, &edge.supplier] {
                if !units.contains(end.as_str()) {
                    return Err(DeployError::configuration(format!(
                        "wiring {} -> {} references unknown unit {end}",
                        edge.consumer, edge.supplier
                    )));
                }
            }
            if edge.consumer == edge.supplier {
                return Err(DeployError::configuration(format!(
                    "unit {} is wired to itself",
                    edge.consumer
                )));
            }
            if edge.logical_name.trim().is_empty() {
                return Err(DeployError::configuration(format!(
                    "wiring from {} has an empty logical name",
                    edge.consumer
                )));
            }
            let variable = environment_variable(&edge.logical_name);
            let key = (edge.consumer.as_str(), variable.clone());
            match variables.insert(key, edge.logical_name.as_str()) {
                None => {}
                Some(previous) if previous == edge.logical_name => {
                    return Err(DeployError::configuration(format!(
                        "unit {} declares logical name {} twice",
                        edge.consumer, edge.logical_name
                    )));
                }
                Some(previous) => {
                    return Err(DeployError::configuration(format!(
                        "unit {}: logical names {previous} and {} both map to {variable}",
                        edge.consumer, edge.logical_name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a unit by name.
    pub fn unit(&self, name: &str) -> DeployResult<&UnitSpec> {
        self.units
            .iter()
            .find(|u| u.name == name)
            .ok_or_else(|| DeployError::configuration(format!("unknown unit: {name}")))
    }

    /// Pick the deployment target.
    ///
    /// Without a name the specification must declare exactly one target.
    pub fn target(&self, name: Option<&str>) -> DeployResult<&TargetSpec> {
        match name {
            Some(name) => self
                .targets
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| DeployError::configuration(format!("unknown target: {name}"))),
            None => match self.targets.as_slice() {
                [only] => Ok(only),
                [] => Err(DeployError::configuration("no deployment targets declared")),
                many => Err(DeployError::configuration(format!(
                    "several targets declared ({}), choose one",
                    many.iter()
                        .map(|t| t.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))),
            },
        }
    }

    /// Physical name of `unit` in `target`.
    #[must_use]
    pub fn physical_name(&self, target: &TargetSpec, unit: &str) -> String {
        physical_name(&self.project, &target.environment, unit)
    }

    /// Source directory of `unit`.
    #[must_use]
    pub fn root_dir(&self, unit: &UnitSpec) -> PathBuf {
        match &unit.root_dir {
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.join(&unit.name),
        }
    }

    /// Outgoing wiring of `consumer`, by logical name.
    #[must_use]
    pub fn wiring_for(&self, consumer: &str, target: &TargetSpec) -> BTreeMap<String, WiringTarget> {
        self.wiring
            .iter()
            .filter(|edge| edge.consumer == consumer)
            .map(|edge| {
                (
                    edge.logical_name.clone(),
                    WiringTarget {
                        physical_name: self.physical_name(target, &edge.supplier),
                        region: target.region.clone(),
                    },
                )
            })
            .collect()
    }
}
