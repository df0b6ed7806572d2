//! Deploy orchestration.
//!
//! A deploy run goes through three barriers:
//!
//! 1. every unit is packaged and pushed, concurrently;
//! 2. one stack is assembled from all units and applied;
//! 3. functions whose deployable changed are pointed at their new code.
//!
//! Any failure aborts the run. Blobs and deployables already written stay
//! valid, so a retried run skips them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use conductor_archive::Fingerprint;
use conductor_build::{PackagedUnit, Packager, UnitBuild};
use conductor_pool::StorageLocation;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::codeupdate::{CodeUpdate, CodeUpdater};
use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::push::{ArtifactPusher, PushOutcome};
use crate::spec::{DeploySpec, TargetSpec, UnitSpec};
use crate::stack::{assemble, ApplyOutcome, StackPusher};

/// Outcome for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    /// Unit name.
    pub unit: String,
    /// Fingerprint of the unit's code, if it has any.
    pub fingerprint: Option<Fingerprint>,
    /// Whether new deployable bytes were written.
    pub was_pushed: bool,
    /// Whether a code-update call was issued.
    pub code_updated: bool,
}

/// Outcome of a deploy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    /// Target name.
    pub target: String,
    /// Per-unit outcomes, in specification order.
    pub units: Vec<UnitReport>,
    /// What applying the stack did.
    pub stack: ApplyOutcome,
}

impl DeployReport {
    /// Outcome for `unit`.
    #[must_use]
    pub fn unit(&self, unit: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.unit == unit)
    }

    /// Number of code-update calls issued.
    #[must_use]
    pub fn code_updates(&self) -> usize {
        self.units.iter().filter(|u| u.code_updated).count()
    }
}

/// Packaging request for `unit`, or `None` for definition-only units.
#[must_use]
pub fn unit_build(spec: &DeploySpec, target: &TargetSpec, unit: &UnitSpec) -> Option<UnitBuild> {
    if !unit.has_code() {
        return None;
    }
    Some(UnitBuild {
        unit: unit.name.clone(),
        root_dir: spec.root_dir(unit),
        entry_point: unit.entry_point.clone()?,
        path_prefix: unit.path_prefix.clone(),
        package_context: spec.base_dir.display().to_string(),
        wiring: spec.wiring_for(&unit.name, target),
    })
}

/// Package every unit with code, concurrently.
pub async fn package_all(
    packager: &Packager,
    spec: &DeploySpec,
    target: &TargetSpec,
) -> DeployResult<Vec<PackagedUnit>> {
    let builds: Vec<UnitBuild> = spec
        .units
        .iter()
        .filter_map(|unit| unit_build(spec, target, unit))
        .collect();
    Ok(try_join_all(builds.iter().map(|build| packager.run(build))).await?)
}

struct StagedUnit {
    unit: String,
    physical_name: String,
    fingerprint: Option<Fingerprint>,
    push: Option<PushOutcome>,
}

impl StagedUnit {
    fn changed(&self) -> bool {
        self.push.as_ref().is_some_and(|p| p.was_pushed)
    }
}

/// Runs deploys.
pub struct Orchestrator {
    packager: Packager,
    pusher: ArtifactPusher,
    stacks: StackPusher,
    updater: Arc<dyn CodeUpdater>,
}

impl Orchestrator {
    /// Create an orchestrator from its parts.
    pub fn new(
        packager: Packager,
        pusher: ArtifactPusher,
        stacks: StackPusher,
        updater: Arc<dyn CodeUpdater>,
    ) -> Self {
        Self {
            packager,
            pusher,
            stacks,
            updater,
        }
    }

    /// Build an orchestrator from configuration for a project rooted at
    /// `base_dir`.
    pub async fn from_config(config: &DeployConfig, base_dir: &Path) -> DeployResult<Self> {
        let buckets = config.buckets()?;
        Ok(Self::new(
            config.packager(base_dir).await?,
            config.artifact_pusher(&buckets)?,
            StackPusher::new(config.stack_backend(&buckets)?),
            config.code_updater()?,
        ))
    }

    /// Deploy `spec` to the named target.
    #[instrument(skip(self, spec), fields(project = %spec.project))]
    pub async fn deploy(
        &self,
        spec: &DeploySpec,
        target: Option<&str>,
    ) -> DeployResult<DeployReport> {
        spec.validate()?;
        let target = spec.target(target)?;
        info!(
            target = %target.name,
            units = spec.units.len(),
            "deploy starting"
        );

        let staged =
            try_join_all(spec.units.iter().map(|unit| self.stage(spec, target, unit))).await?;

        let code: BTreeMap<String, StorageLocation> = staged
            .iter()
            .filter_map(|s| Some((s.unit.clone(), s.push.as_ref()?.location.clone())))
            .collect();
        let stack = assemble(spec, target, &code)?;
        let outcome = self.stacks.deploy(&stack).await?;

        let changed: Vec<&StagedUnit> = staged.iter().filter(|s| s.changed()).collect();
        try_join_all(changed.iter().map(|s| self.update_code(s))).await?;
        let updated: BTreeSet<&str> = changed.iter().map(|s| s.unit.as_str()).collect();

        let units: Vec<UnitReport> = staged
            .iter()
            .map(|s| UnitReport {
                unit: s.unit.clone(),
                fingerprint: s.fingerprint.clone(),
                was_pushed: s.changed(),
                code_updated: updated.contains(s.unit.as_str()),
            })
            .collect();

        info!(
            target = %target.name,
            stack = ?outcome,
            code_updates = updated.len(),
            "deploy complete"
        );
        Ok(DeployReport {
            target: target.name.clone(),
            units,
            stack: outcome,
        })
    }

    async fn stage(
        &self,
        spec: &DeploySpec,
        target: &TargetSpec,
        unit: &UnitSpec,
    ) -> DeployResult<StagedUnit> {
        let physical_name = spec.physical_name(target, &unit.name);
        let Some(build) = unit_build(spec, target, unit) else {
            debug!(unit = %unit.name, "definition-only unit");
            return Ok(StagedUnit {
                unit: unit.name.clone(),
                physical_name,
                fingerprint: None,
                push: None,
            });
        };

        let packaged = self.packager.run(&build).await?;
        let push = self.pusher.push(&physical_name, &packaged).await?;
        Ok(StagedUnit {
            unit: unit.name.clone(),
            physical_name,
            fingerprint: Some(packaged.fingerprint),
            push: Some(push),
        })
    }

    async fn update_code(&self, unit: &StagedUnit) -> DeployResult<()> {
        let location = &unit
            .push
            .as_ref()
            .ok_or_else(|| DeployError::internal(format!("{} was never pushed", unit.unit)))?
            .location;
        self.updater
            .update(&CodeUpdate {
                function_identifier: unit.physical_name.clone(),
                code_location_bucket: location.bucket.clone(),
                code_location_key: location.key.clone(),
            })
            .await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("packager", &self.packager)
            .field("pusher", &self.pusher)
            .finish_non_exhaustive()
    }
}
