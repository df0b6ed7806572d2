//! Building a stack from the deploy specification.

use std::collections::BTreeMap;

use conductor_pool::StorageLocation;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Stack, StackResource};
use crate::error::{DeployError, DeployResult};
use crate::naming::{environment_variable, stack_name};
use crate::spec::{DeploySpec, PolicyStatement, TargetSpec, WiringSpec};

/// What a supplier contributes to a consumer's resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    /// An environment entry, usually the supplier's physical name.
    Environment {
        /// Variable name.
        variable: String,
        /// Value.
        value: String,
    },
    /// Permission statements appended to the consumer's policy.
    Policy(Vec<PolicyStatement>),
    /// The consumer depends on this resource.
    DependsOn(String),
}

impl Contribution {
    /// Contributions of one wiring edge, in application order.
    #[must_use]
    pub fn for_edge(edge: &WiringSpec, supplier_physical: &str) -> Vec<Self> {
        let mut contributions = vec![Self::Environment {
            variable: environment_variable(&edge.logical_name),
            value: supplier_physical.to_owned(),
        }];

        if !edge.policy.is_empty() {
            let statements = edge
                .policy
                .iter()
                .map(|statement| {
                    let mut statement = statement.clone();
                    if statement.resources.is_empty() {
                        statement.resources.push(supplier_physical.to_owned());
                    }
                    statement
                })
                .collect();
            contributions.push(Self::Policy(statements));
        }

        contributions.push(Self::DependsOn(edge.supplier.clone()));
        contributions
    }

    /// Apply this contribution to `resource`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the resource already carries an
    /// `environment` that is not an object or a `policy` that is not an array.
    pub fn apply(&self, mut resource: StackResource) -> DeployResult<StackResource> {
        match self {
            Self::Environment { variable, value } => {
                let entry = resource
                    .properties
                    .entry("environment")
                    .or_insert_with(|| Value::Object(Map::new()));
                let Value::Object(environment) = entry else {
                    return Err(DeployError::configuration(format!(
                        "resource {}: environment must be an object",
                        resource.logical_name
                    )));
                };
                environment.insert(variable.clone(), Value::String(value.clone()));
            }
            Self::Policy(statements) => {
                let entry = resource
                    .properties
                    .entry("policy")
                    .or_insert_with(|| Value::Array(Vec::new()));
                let Value::Array(policy) = entry else {
                    return Err(DeployError::configuration(format!(
                        "resource {}: policy must be an array",
                        resource.logical_name
                    )));
                };
                policy.extend(statements.iter().map(|s| {
                    json!({
                        "effect": s.effect,
                        "actions": s.actions,
                        "resources": s.resources,
                    })
                }));
            }
            Self::DependsOn(name) => {
                resource.depends_on.insert(name.clone());
            }
        }
        Ok(resource)
    }
}

/// Build the stack for `target`.
///
/// Every unit becomes one resource named after the unit, carrying its
/// physical name and, if it has code, the location of its deployable.
/// Wiring contributions are then applied consumer by consumer in name order,
/// and within a consumer in logical-name order, so the same specification
/// always yields the same stack.
pub fn assemble(
    spec: &DeploySpec,
    target: &TargetSpec,
    code: &BTreeMap<String, StorageLocation>,
) -> DeployResult<Stack> {
    let mut resources = BTreeMap::new();
    for unit in &spec.units {
        let mut properties = unit.resource.properties.clone();
        properties.insert(
            "physicalName".to_owned(),
            Value::String(spec.physical_name(target, &unit.name)),
        );
        if let Some(location) = code.get(&unit.name) {
            properties.insert(
                "code".to_owned(),
                json!({ "bucket": location.bucket, "key": location.key }),
            );
        }
        resources.insert(
            unit.name.clone(),
            StackResource::new(&unit.name, &unit.resource.resource_type, properties),
        );
    }

    let mut edges: Vec<&WiringSpec> = spec.wiring.iter().collect();
    edges.sort_by(|a, b| {
        (a.consumer.as_str(), a.logical_name.as_str())
            .cmp(&(b.consumer.as_str(), b.logical_name.as_str()))
    });

    for edge in edges {
        let resource = resources.remove(&edge.consumer).ok_or_else(|| {
            DeployError::configuration(format!("wiring from unknown unit {}", edge.consumer))
        })?;
        let supplier = spec.physical_name(target, &edge.supplier);
        let resource = Contribution::for_edge(edge, &supplier)
            .iter()
            .try_fold(resource, |resource, contribution| contribution.apply(resource))?;
        debug!(
            consumer = %edge.consumer,
            logical_name = %edge.logical_name,
            supplier = %supplier,
            "wiring applied"
        );
        resources.insert(edge.consumer.clone(), resource);
    }

    Ok(Stack {
        name: stack_name(&spec.project, &target.environment),
        resources,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spec() -> DeploySpec {
        serde_json::from_value(json!({
            "project": "shop",
            "units": [
                {"name": "api", "entry_point": "index.js",
                 "resource": {"type": "function", "properties": {"environment": {"MODE": "live"}}}},
                {"name": "orders", "resource": {"type": "table"}},
                {"name": "events", "resource": {"type": "queue"}}
            ],
            "targets": [{"name": "prod", "region": "eu-west-1", "environment": "prod"}],
            "wiring": [
                {"consumer": "api", "logical_name": "orders", "supplier": "orders",
                 "policy": [{"actions": ["table:Get"]}]},
                {"consumer": "api", "logical_name": "events", "supplier": "events",
                 "policy": [{"actions": ["queue:Send"], "resources": ["*"]}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn wiring_contributes_environment_policy_and_dependencies() {
        let spec = spec();
        let target = spec.target(None).unwrap();
        let code = BTreeMap::from([(
            "api".to_owned(),
            StorageLocation::new("artifacts", "deployables/shop-prod-api.zip"),
        )]);

        let stack = assemble(&spec, target, &code).unwrap();
        assert_eq!(stack.name, "shop-prod");

        let api = &stack.resources["api"];
        assert_eq!(api.properties["physicalName"], "shop-prod-api");
        assert_eq!(
            api.properties["code"]["key"],
            "deployables/shop-prod-api.zip"
        );
        assert_eq!(
            api.properties["environment"],
            json!({
                "MODE": "live",
                "CONDUCTOR_EVENTS": "shop-prod-events",
                "CONDUCTOR_ORDERS": "shop-prod-orders"
            })
        );
        assert_eq!(
            api.properties["policy"],
            json!([
                {"effect": "Allow", "actions": ["queue:Send"], "resources": ["*"]},
                {"effect": "Allow", "actions": ["table:Get"], "resources": ["shop-prod-orders"]}
            ])
        );
        assert_eq!(
            api.depends_on.iter().collect::<Vec<_>>(),
            vec!["events", "orders"]
        );

        let orders = &stack.resources["orders"];
        assert!(orders.depends_on.is_empty());
        assert!(orders.properties.get("code").is_none());
    }

    #[test]
    fn assembly_ignores_declaration_order() {
        let spec = spec();
        let mut reversed = spec.clone();
        reversed.units.reverse();
        reversed.wiring.reverse();
        let target = spec.target(None).unwrap();

        let a = assemble(&spec, target, &BTreeMap::new()).unwrap();
        let b = assemble(&reversed, target, &BTreeMap::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn contributions_are_pure() {
        let resource = StackResource::new("api", "function", Map::new());
        let contribution = Contribution::DependsOn("orders".to_owned());

        let applied = contribution.apply(resource.clone()).unwrap();
        assert!(resource.depends_on.is_empty());
        assert!(applied.depends_on.contains("orders"));
        assert_eq!(contribution.apply(applied.clone()).unwrap(), applied);
    }

    #[test]
    fn mistyped_user_properties_are_rejected() {
        let mut spec = spec();
        spec.units[0]
            .resource
            .properties
            .insert("environment".to_owned(), json!("MODE=live"));
        let target = spec.target(None).unwrap();
        let err = assemble(&spec, target, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
        assert!(err.to_string().contains("environment must be an object"));

        let mut properties = Map::new();
        properties.insert("policy".to_owned(), json!({"effect": "Allow"}));
        let resource = StackResource::new("api", "function", properties.clone());
        let err = Contribution::Policy(Vec::new()).apply(resource).unwrap_err();
        assert!(err.to_string().contains("policy must be an array"));

        // A user's well-typed entries survive untouched.
        properties.insert("policy".to_owned(), json!([{"effect": "Deny"}]));
        let resource = StackResource::new("api", "function", properties);
        let applied = Contribution::Policy(Vec::new()).apply(resource).unwrap();
        assert_eq!(applied.properties["policy"], json!([{"effect": "Deny"}]));
    }
}
