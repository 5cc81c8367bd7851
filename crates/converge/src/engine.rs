//! Convergence engine - walks a plan in declaration order
//!
//! Per resource: `Pending -> Guards -> Querying -> {Unchanged, Applying} ->
//! {Changed, Failed}`, or `Skipped` from any point before applying.
//! Declaration order is the only dependency order; nothing is reordered and
//! nothing runs in parallel.

use crate::adapter::{AdapterRegistry, ResourceAdapter};
use crate::compile::Plan;
use crate::context::{CancelToken, NoProgress, Phase, ProgressCallback};
use crate::error::{ErrorCategory, ErrorDetail, ErrorKind, HostError};
use crate::guard::GuardVerdict;
use crate::host::Host;
use crate::notify::{NotificationEdge, Timing};
use crate::report::{NotificationRecord, RunOutcome, RunReport, SkipReason, Status};
use crate::resource::{Action, Resource, ResourceId};
use crate::types::{EngineOptions, Observation};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

/// One pending change found by a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub action: Action,
    pub observation: Observation,
}

/// Dry-run verdict for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStatus {
    /// Every requested action is satisfied
    Converged,
    /// These actions would be applied
    WouldChange(Vec<PlannedChange>),
    Skipped(SkipReason),
    /// Guards or queries could not be evaluated
    Failed(ErrorDetail),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub id: ResourceId,
    pub status: PlanStatus,
}

/// Drives resources through their adapters
pub struct Engine<'h> {
    host: Host<'h>,
    adapters: AdapterRegistry,
    options: EngineOptions,
    cancel: CancelToken,
}

impl<'h> Engine<'h> {
    /// Engine with the standard adapters and fail-fast behaviour
    pub fn new(host: Host<'h>) -> Self {
        Self {
            host,
            adapters: AdapterRegistry::standard(),
            options: EngineOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Converge the host to `plan`.
    ///
    /// Never returns early on failure: every declared resource gets an
    /// outcome in the report, in declaration order.
    pub fn run<P: ProgressCallback>(&self, plan: &Plan, progress: &mut P) -> RunReport {
        let started = Instant::now();
        let mut bus = plan.bus.clone();
        let mut report = RunReport::default();
        let mut halted_after: Option<ResourceId> = None;
        let mut any_failure = false;

        progress.on_run_start(plan.len());

        for (index, resource) in plan.resources.iter().enumerate() {
            if let Some(after) = &halted_after {
                let outcome = RunOutcome::skipped(
                    resource.id.clone(),
                    SkipReason::Halted {
                        after: after.clone(),
                    },
                    Duration::ZERO,
                );
                progress.on_resource_complete(&outcome);
                report.outcomes.push(outcome);
                continue;
            }

            if self.cancel.is_cancelled() {
                if !report.cancelled {
                    log::warn!("run cancelled before {}", resource.id);
                }
                report.cancelled = true;
                let outcome = RunOutcome::skipped(
                    resource.id.clone(),
                    SkipReason::Cancelled,
                    Duration::ZERO,
                );
                progress.on_resource_complete(&outcome);
                report.outcomes.push(outcome);
                continue;
            }

            progress.on_resource_start(index, resource);
            let outcome = self.converge(resource, progress);
            progress.on_resource_complete(&outcome);
            let status = outcome.status;
            report.outcomes.push(outcome);

            match status {
                Status::Failed => {
                    any_failure = true;
                    if !self.options.continue_on_error {
                        log::warn!("halting run after {} failed", resource.id);
                        halted_after = Some(resource.id.clone());
                    }
                }
                Status::Changed => {
                    let edges: Vec<NotificationEdge> = bus.edges_for(&resource.id).cloned().collect();
                    let mut edges = edges.into_iter();
                    while let Some(edge) = edges.next() {
                        match edge.timing {
                            Timing::Immediate => {
                                let record = self.notify(plan, &edge, progress);
                                let failed = record.error.is_some();
                                report.notifications.push(record);
                                if failed {
                                    any_failure = true;
                                    if !self.options.continue_on_error {
                                        let reason = SkipReason::Halted {
                                            after: edge.target.clone(),
                                        };
                                        for rest in edges.by_ref() {
                                            let record = NotificationRecord::skipped(rest, reason.clone());
                                            progress.on_notification(&record);
                                            report.notifications.push(record);
                                        }
                                        halted_after = Some(edge.target.clone());
                                        break;
                                    }
                                }
                            }
                            Timing::Delayed => {
                                if bus.queue(edge.clone()) {
                                    log::debug!("queued delayed notification {edge}");
                                } else {
                                    log::debug!("{} already queued, dropping {edge}", edge.target);
                                }
                            }
                        }
                    }
                }
                Status::Unchanged | Status::Skipped => {}
            }
        }

        if any_failure || report.cancelled {
            let reason = match report.first_failure() {
                Some((id, _)) if !report.cancelled => SkipReason::Halted { after: id.clone() },
                _ => SkipReason::Cancelled,
            };
            for edge in bus.discard_pending() {
                let record = NotificationRecord::skipped(edge, reason.clone());
                progress.on_notification(&record);
                report.notifications.push(record);
            }
        } else {
            let mut stop: Option<SkipReason> = None;
            let unfired = bus.fire_delayed(|edge| {
                if self.cancel.is_cancelled() {
                    log::warn!("run cancelled before notifying {}", edge.target);
                    let record = NotificationRecord::skipped(edge.clone(), SkipReason::Cancelled);
                    progress.on_notification(&record);
                    report.notifications.push(record);
                    report.cancelled = true;
                    stop = Some(SkipReason::Cancelled);
                    return ControlFlow::Break(());
                }
                let record = self.notify(plan, edge, progress);
                let failed = record.error.is_some();
                report.notifications.push(record);
                if failed && !self.options.continue_on_error {
                    stop = Some(SkipReason::Halted {
                        after: edge.target.clone(),
                    });
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            });

            if let Some(reason) = stop {
                for edge in unfired {
                    let record = NotificationRecord::skipped(edge, reason.clone());
                    progress.on_notification(&record);
                    report.notifications.push(record);
                }
            }
        }

        report.elapsed = started.elapsed();
        let summary = report.summary();
        log::debug!(
            "run finished: {} changed, {} unchanged, {} failed, {} skipped",
            summary.changed,
            summary.unchanged,
            summary.failed,
            summary.skipped
        );
        report
    }

    /// Run without progress reporting
    pub fn run_simple(&self, plan: &Plan) -> RunReport {
        self.run(plan, &mut NoProgress)
    }

    /// Dry run: evaluate guards and query every resource without applying.
    ///
    /// Each resource is queried against the host as it is now, so changes an
    /// earlier resource would make are not accounted for.
    pub fn plan(&self, plan: &Plan) -> Vec<PlanEntry> {
        plan.resources
            .iter()
            .map(|resource| PlanEntry {
                id: resource.id.clone(),
                status: self.plan_resource(resource),
            })
            .collect()
    }

    fn plan_resource(&self, resource: &Resource) -> PlanStatus {
        if resource.is_notification_only() {
            return PlanStatus::Skipped(SkipReason::NoAction);
        }
        match resource.guards.evaluate(&self.host) {
            Err(e) => return PlanStatus::Failed(ErrorDetail::from_host(ErrorKind::Guard, &e)),
            Ok(GuardVerdict::Skip(detail)) => return PlanStatus::Skipped(SkipReason::Guard { detail }),
            Ok(GuardVerdict::Run) => {}
        }
        let Some(adapter) = self.adapters.get(resource.kind()) else {
            return PlanStatus::Failed(missing_adapter(resource));
        };

        let mut changes = Vec::new();
        for &action in resource.actions.iter().filter(|a| **a != Action::Nothing) {
            match adapter.query(resource, action, &self.host) {
                Ok(observation) if observation.is_converged() => {}
                Ok(observation) => changes.push(PlannedChange { action, observation }),
                Err(e) => return PlanStatus::Failed(ErrorDetail::from_host(ErrorKind::Query, &e)),
            }
        }

        if changes.is_empty() {
            PlanStatus::Converged
        } else {
            PlanStatus::WouldChange(changes)
        }
    }

    /// Drive one resource through its state machine
    fn converge<P: ProgressCallback>(&self, resource: &Resource, progress: &mut P) -> RunOutcome {
        let started = Instant::now();
        let id = resource.id.clone();

        if resource.is_notification_only() {
            log::debug!("{id}: only runs when notified");
            return RunOutcome::skipped(id, SkipReason::NoAction, started.elapsed());
        }

        if !resource.guards.is_empty() {
            progress.on_phase(&id, Phase::Guards);
            match resource.guards.evaluate(&self.host) {
                Err(e) => {
                    log::debug!("{id}: guard evaluation failed: {e}");
                    let detail = ErrorDetail::from_host(ErrorKind::Guard, &e);
                    return RunOutcome::failed(id, detail, Vec::new(), started.elapsed());
                }
                Ok(GuardVerdict::Skip(detail)) => {
                    log::debug!("{id}: skipped, {detail}");
                    return RunOutcome::skipped(id, SkipReason::Guard { detail }, started.elapsed());
                }
                Ok(GuardVerdict::Run) => {}
            }
        }

        let Some(adapter) = self.adapters.get(resource.kind()) else {
            return RunOutcome::failed(id, missing_adapter(resource), Vec::new(), started.elapsed());
        };

        progress.on_phase(&id, Phase::Querying);
        let mut snapshot = Vec::with_capacity(resource.actions.len());
        for &action in resource.actions.iter().filter(|a| **a != Action::Nothing) {
            match self.observe(resource, adapter, action) {
                Ok(diverged) => snapshot.push((action, diverged)),
                Err(detail) => return RunOutcome::failed(id, detail, Vec::new(), started.elapsed()),
            }
        }

        if snapshot.iter().all(|(_, diverged)| !diverged) {
            return RunOutcome::unchanged(id, started.elapsed());
        }

        progress.on_phase(&id, Phase::Applying);
        let mut applied = Vec::new();
        // Once an action has changed the host, later observations are stale
        for (action, diverged) in snapshot {
            let diverged = if applied.is_empty() {
                diverged
            } else {
                match self.observe(resource, adapter, action) {
                    Ok(diverged) => diverged,
                    Err(detail) => return RunOutcome::failed(id, detail, applied, started.elapsed()),
                }
            };
            if !diverged {
                continue;
            }
            match adapter.apply(resource, action, &self.host) {
                Ok(true) => applied.push(action),
                Ok(false) => log::debug!("{id}: {action} made no change"),
                Err(e) => {
                    log::debug!("{id}: {action} failed: {e}");
                    let detail = ErrorDetail::from_host(ErrorKind::Apply, &e);
                    return RunOutcome::failed(id, detail, applied, started.elapsed());
                }
            }
        }

        if applied.is_empty() {
            RunOutcome::unchanged(id, started.elapsed())
        } else {
            log::info!("{id} changed");
            RunOutcome::changed(id, applied, started.elapsed())
        }
    }

    /// Query one action; true when it diverges from the desired state
    fn observe(
        &self,
        resource: &Resource,
        adapter: &dyn ResourceAdapter,
        action: Action,
    ) -> Result<bool, ErrorDetail> {
        let id = &resource.id;
        match adapter.query(resource, action, &self.host) {
            Ok(observation) if observation.is_converged() => {
                log::debug!("{id}: {action} converged ({})", observation.current);
                Ok(false)
            }
            Ok(observation) => {
                log::debug!(
                    "{id}: {action} diverged ({} -> {})",
                    observation.current,
                    observation.desired
                );
                Ok(true)
            }
            Err(e) => {
                log::debug!("{id}: {action} query failed: {e}");
                Err(ErrorDetail::from_host(ErrorKind::Query, &e))
            }
        }
    }

    /// Fire one notification: the target's guards still apply, its state is not queried
    fn notify<P: ProgressCallback>(
        &self,
        plan: &Plan,
        edge: &NotificationEdge,
        progress: &mut P,
    ) -> NotificationRecord {
        let record = match self.fire(plan, edge) {
            Ok(None) => {
                log::info!("notified {} to {}", edge.target, edge.action);
                NotificationRecord::fired(edge.clone())
            }
            Ok(Some(detail)) => {
                log::debug!("notification {edge} skipped: {detail}");
                NotificationRecord::skipped(edge.clone(), SkipReason::Guard { detail })
            }
            Err(error) => {
                log::warn!("notification {edge} failed: {error}");
                NotificationRecord::failed(edge.clone(), error)
            }
        };
        progress.on_notification(&record);
        record
    }

    /// Ok(None) when fired, Ok(Some(reason)) when a guard skipped it
    fn fire(&self, plan: &Plan, edge: &NotificationEdge) -> Result<Option<String>, ErrorDetail> {
        let target = plan.get(&edge.target).ok_or_else(|| ErrorDetail {
            kind: ErrorKind::Apply,
            category: ErrorCategory::NotFound,
            message: format!("{} is not part of this plan", edge.target),
        })?;
        let adapter = self
            .adapters
            .get(target.kind())
            .ok_or_else(|| missing_adapter(target))?;

        match target.guards.evaluate(&self.host) {
            Err(e) => return Err(ErrorDetail::from_host(ErrorKind::Guard, &e)),
            Ok(GuardVerdict::Skip(detail)) => return Ok(Some(detail)),
            Ok(GuardVerdict::Run) => {}
        }

        adapter
            .apply(target, edge.action, &self.host)
            .map(|_| None)
            .map_err(|e: HostError| ErrorDetail::from_host(ErrorKind::Apply, &e))
    }
}

fn missing_adapter(resource: &Resource) -> ErrorDetail {
    ErrorDetail {
        kind: ErrorKind::Query,
        category: ErrorCategory::Other,
        message: format!("no adapter registered for {}", resource.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Declaration;
    use crate::host::ServiceStatus;
    use crate::resource::Kind;
    use crate::testing::FakeHost;

    fn compile(decls: &[Declaration]) -> Plan {
        Plan::compile(decls).unwrap()
    }

    fn statuses(report: &RunReport) -> Vec<Status> {
        report.outcomes.iter().map(|o| o.status).collect()
    }

    fn running_containerd(fake: &FakeHost) {
        fake.state().services.insert(
            "containerd".to_string(),
            ServiceStatus {
                enabled: true,
                running: true,
            },
        );
    }

    /// Records every callback so ordering can be asserted
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_run_start(&mut self, total: usize) {
            self.events.push(format!("start {total}"));
        }
        fn on_resource_start(&mut self, _index: usize, resource: &Resource) {
            self.events.push(format!("begin {}", resource.id));
        }
        fn on_resource_complete(&mut self, outcome: &RunOutcome) {
            self.events.push(format!("{} {}", outcome.status, outcome.id));
        }
        fn on_notification(&mut self, record: &NotificationRecord) {
            self.events.push(format!("notify {} {}", record.edge.target, record.status));
        }
    }

    #[test]
    fn test_loaded_module_unchanged_without_apply() {
        let fake = FakeHost::new();
        fake.state().modules.insert("overlay".to_string());
        let plan = compile(&[Declaration::new("kernel_module", "overlay")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Unchanged]);
        assert_eq!(fake.log(), vec!["kmod query overlay"]);
    }

    #[test]
    fn test_absent_file_created() {
        let fake = FakeHost::new();
        let plan = compile(&[Declaration::new("file", "/etc/modules-load.d/overlay.conf")
            .attr("content", "overlay")
            .attr("mode", "0644")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Changed]);
        assert_eq!(report.outcomes[0].applied, vec![Action::Create]);
        assert_eq!(
            fake.file("/etc/modules-load.d/overlay.conf"),
            Some(("overlay".to_string(), 0o644))
        );
        assert_eq!(report.exit_code(false), 0);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let fake = FakeHost::new();
        fake.state()
            .sysctl
            .insert("net.ipv4.ip_forward".to_string(), "0".to_string());
        fake.state()
            .secrets
            .insert("k8s-dev-password".to_string(), "$6$hash".to_string());
        fake.set_command_exit("swapon -s | grep -q /dev", 1);
        let plan = compile(&[
            Declaration::new("package", "curl"),
            Declaration::new("kernel_module", "overlay"),
            Declaration::new("file", "/etc/modules-load.d/overlay.conf")
                .attr("content", "overlay")
                .attr("mode", "0644"),
            Declaration::new("sysctl_param", "net.ipv4.ip_forward").attr("value", 1),
            Declaration::new("mount", "swap").action("disable"),
            Declaration::new("execute", "turn_off_swap")
                .attr("command", "swapoff -a")
                .attr("only_if", "swapon -s | grep -q /dev"),
            Declaration::new("user", "k8s-dev")
                .attr("uid", 1234)
                .attr("gid", "users")
                .attr("password_secret", "k8s-dev-password"),
        ]);
        let engine = Engine::new(fake.host());

        let first = engine.run_simple(&plan);
        assert_eq!(first.summary().failed, 0);
        assert!(first.summary().changed > 0);

        let second = engine.run_simple(&plan);
        let summary = second.summary();
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_bundled_recipe_second_run_is_idempotent() {
        #[derive(serde::Deserialize)]
        struct Recipe {
            resource: Vec<Declaration>,
        }
        let recipe: Recipe = toml::from_str(include_str!("../../../recipes/k8s-node.toml")).unwrap();
        let plan = compile(&recipe.resource);

        let fake = FakeHost::new();
        {
            let mut state = fake.state();
            for key in ["net.bridge.bridge-nf-call-iptables", "net.ipv4.ip_forward"] {
                state.sysctl.insert(key.to_string(), "0".to_string());
            }
            state
                .secrets
                .insert("k8s-dev-password".to_string(), "$6$hash".to_string());
            state.services.insert("containerd".to_string(), ServiceStatus::default());
            state.command_creates.insert(
                "curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor -o /usr/share/keyrings/docker-archive-keyring.gpg".to_string(),
                std::path::PathBuf::from("/usr/share/keyrings/docker-archive-keyring.gpg"),
            );
        }
        fake.set_command_exit("swapon -s | grep -q /dev", 1);
        let engine = Engine::new(fake.host());

        let first = engine.run_simple(&plan);
        assert_eq!(first.summary().failed, 0);
        assert!(first.summary().changed > 0);

        fake.clear_log();
        let second = engine.run_simple(&plan);
        let summary = second.summary();
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.failed, 0);
        assert!(second.notifications.is_empty());
        assert_eq!(fake.log_position("pkg update"), None);
    }

    #[test]
    fn test_declaration_order_is_execution_order() {
        let fake = FakeHost::new();
        let plan = compile(&[
            Declaration::new("package", "gnupg"),
            Declaration::new("kernel_module", "br_netfilter"),
            Declaration::new("package", "curl"),
        ]);

        Engine::new(fake.host()).run_simple(&plan);
        let install_gnupg = fake.log_position("pkg install gnupg").unwrap();
        let query_module = fake.log_position("kmod query br_netfilter").unwrap();
        let load_module = fake.log_position("kmod load br_netfilter").unwrap();
        let query_curl = fake.log_position("pkg query curl").unwrap();
        assert!(install_gnupg < query_module);
        assert!(load_module < query_curl);
    }

    #[test]
    fn test_immediate_notification_before_next_resource() {
        let fake = FakeHost::new();
        running_containerd(&fake);
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/config.toml")
                .attr("content", "version = 2")
                .notifies("restart", "service[containerd]", "immediately"),
            Declaration::new("kernel_module", "overlay"),
            Declaration::new("service", "containerd").action("enable").action("start"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        let restart = fake.log_position("svc restart containerd").unwrap();
        let next = fake.log_position("kmod query overlay").unwrap();
        assert!(restart < next);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].status, Status::Changed);
        assert_eq!(
            statuses(&report),
            vec![Status::Changed, Status::Changed, Status::Unchanged]
        );
    }

    #[test]
    fn test_unchanged_source_does_not_notify() {
        let fake = FakeHost::new();
        running_containerd(&fake);
        fake.put_file("/etc/containerd/config.toml", b"version = 2", 0o644);
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/config.toml")
                .attr("content", "version = 2")
                .notifies("restart", "service[containerd]", "immediately"),
            Declaration::new("service", "containerd").action("start"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert!(report.notifications.is_empty());
        assert!(fake.log_position("svc restart containerd").is_none());
    }

    #[test]
    fn test_delayed_notification_fires_once_after_walk() {
        let fake = FakeHost::new();
        running_containerd(&fake);
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/a.toml")
                .attr("content", "a")
                .notifies("restart", "service[containerd]", "delayed"),
            Declaration::new("file", "/etc/containerd/b.toml")
                .attr("content", "b")
                .notifies("reload", "service[containerd]", "delayed"),
            Declaration::new("kernel_module", "overlay"),
            Declaration::new("service", "containerd").action("start"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        let log = fake.log();
        let restarts = log.iter().filter(|e| *e == "svc restart containerd").count();
        assert_eq!(restarts, 1);
        assert!(!log.contains(&"svc reload containerd".to_string()));

        let restart = fake.log_position("svc restart containerd").unwrap();
        let last_query = fake.log_position("svc status containerd").unwrap();
        assert!(last_query < restart);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].edge.action, Action::Restart);
    }

    #[test]
    fn test_nothing_resource_runs_only_when_notified() {
        let fake = FakeHost::new();
        let plan = compile(&[
            Declaration::new("execute", "reload_sysctl")
                .action("nothing")
                .attr("command", "sysctl --system"),
            Declaration::new("file", "/etc/sysctl.d/k8s.conf")
                .attr("content", "net.ipv4.ip_forward = 1")
                .notifies("run", "execute[reload_sysctl]", "immediate"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(report.outcomes[0].status, Status::Skipped);
        assert_eq!(report.outcomes[0].skip_reason, Some(SkipReason::NoAction));
        assert!(fake.log().contains(&"sh sysctl --system".to_string()));
    }

    #[test]
    fn test_only_if_false_skips_without_apply() {
        let fake = FakeHost::new();
        fake.set_command_exit("swapon -s | grep -q /dev", 1);
        let plan = compile(&[Declaration::new("execute", "turn_off_swap")
            .attr("command", "swapoff -a")
            .attr("only_if", "swapon -s | grep -q /dev")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Skipped]);
        assert!(matches!(
            &report.outcomes[0].skip_reason,
            Some(SkipReason::Guard { detail }) if detail.contains("only_if")
        ));
        assert!(!fake.log().contains(&"sh swapoff -a".to_string()));
        assert_eq!(report.exit_code(true), 0);
    }

    #[test]
    fn test_creates_guard_skips() {
        let fake = FakeHost::new();
        fake.put_file("/usr/share/keyrings/docker-archive-keyring.gpg", b"k", 0o644);
        let plan = compile(&[Declaration::new("execute", "add_docker_gpg")
            .attr("command", "curl -fsSL https://download.docker.com/linux/ubuntu/gpg | gpg --dearmor -o /usr/share/keyrings/docker-archive-keyring.gpg")
            .attr("creates", "/usr/share/keyrings/docker-archive-keyring.gpg")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Skipped]);
        assert!(fake.log().is_empty());
    }

    #[test]
    fn test_fail_fast_skips_remaining() {
        let fake = FakeHost::new();
        fake.state().unknown_packages.insert("containerd.io".to_string());
        let plan = compile(&[
            Declaration::new("package", "curl"),
            Declaration::new("package", "containerd.io"),
            Declaration::new("kernel_module", "overlay"),
            Declaration::new("package", "gnupg"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(
            statuses(&report),
            vec![Status::Changed, Status::Failed, Status::Skipped, Status::Skipped]
        );
        let halted = SkipReason::Halted {
            after: ResourceId::new(Kind::Package, "containerd.io"),
        };
        assert_eq!(report.outcomes[2].skip_reason, Some(halted));
        assert!(fake.log_position("kmod query overlay").is_none());

        let error = report.outcomes[1].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Apply);
        assert_eq!(error.category, ErrorCategory::NotFound);
        assert_eq!(report.exit_code(false), 1);
    }

    #[test]
    fn test_continue_on_error_keeps_walking() {
        let fake = FakeHost::new();
        fake.state().unknown_packages.insert("containerd.io".to_string());
        let plan = compile(&[
            Declaration::new("package", "containerd.io"),
            Declaration::new("kernel_module", "overlay"),
        ]);

        let report = Engine::new(fake.host())
            .with_options(EngineOptions {
                continue_on_error: true,
            })
            .run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Failed, Status::Changed]);
        assert_eq!(report.exit_code(false), 1);
    }

    #[test]
    fn test_delayed_not_fired_after_failure() {
        let fake = FakeHost::new();
        running_containerd(&fake);
        fake.state().unknown_packages.insert("kubelet".to_string());
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/config.toml")
                .attr("content", "version = 2")
                .notifies("restart", "service[containerd]", "delayed"),
            Declaration::new("package", "kubelet"),
            Declaration::new("service", "containerd").action("start"),
        ]);

        let report = Engine::new(fake.host())
            .with_options(EngineOptions {
                continue_on_error: true,
            })
            .run_simple(&plan);
        assert!(fake.log_position("svc restart containerd").is_none());
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].status, Status::Skipped);
        assert_eq!(report.summary().notifications_skipped, 1);
    }

    #[test]
    fn test_query_failure_never_applies() {
        let fake = FakeHost::new();
        fake.fail("kmod query");
        let plan = compile(&[Declaration::new("kernel_module", "overlay")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Failed]);
        assert_eq!(report.outcomes[0].error.as_ref().unwrap().kind, ErrorKind::Query);
        assert!(fake.log_position("kmod load overlay").is_none());
    }

    #[test]
    fn test_guard_evaluation_error_fails() {
        let fake = FakeHost::new();
        fake.set_command_hangs("test -e /dev/sdb");
        let plan = compile(&[Declaration::new("package", "curl").attr("only_if", "test -e /dev/sdb")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Failed]);
        // a hanging guard reports the timeout kind
        assert_eq!(report.outcomes[0].error.as_ref().unwrap().kind, ErrorKind::Timeout);
        assert!(fake.log_position("pkg query curl").is_none());
    }

    #[test]
    fn test_command_timeout_reported_as_timeout() {
        let fake = FakeHost::new();
        fake.set_command_hangs("kubeadm init");
        let plan = compile(&[Declaration::new("execute", "init")
            .attr("command", "kubeadm init")
            .attr("timeout", 30)]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        let error = report.outcomes[0].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_cancelled_run_skips_remaining() {
        let fake = FakeHost::new();
        let plan = compile(&[
            Declaration::new("package", "curl"),
            Declaration::new("package", "gnupg"),
        ]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = Engine::new(fake.host()).with_cancel(cancel).run_simple(&plan);
        assert!(report.cancelled);
        assert_eq!(statuses(&report), vec![Status::Skipped, Status::Skipped]);
        assert_eq!(report.summary().cancelled, 2);
        assert_eq!(report.exit_code(false), 0);
        assert_eq!(report.exit_code(true), 1);
        assert!(fake.log().is_empty());
    }

    #[test]
    fn test_cancel_between_resources() {
        struct CancelAfterFirst(CancelToken);
        impl ProgressCallback for CancelAfterFirst {
            fn on_resource_complete(&mut self, _outcome: &RunOutcome) {
                self.0.cancel();
            }
        }

        let fake = FakeHost::new();
        let plan = compile(&[
            Declaration::new("package", "curl"),
            Declaration::new("package", "gnupg"),
        ]);
        let cancel = CancelToken::new();
        let engine = Engine::new(fake.host()).with_cancel(cancel.clone());

        let report = engine.run(&plan, &mut CancelAfterFirst(cancel));
        assert_eq!(statuses(&report), vec![Status::Changed, Status::Skipped]);
        assert_eq!(report.outcomes[1].skip_reason, Some(SkipReason::Cancelled));
    }

    #[test]
    fn test_failed_immediate_notification_halts() {
        let fake = FakeHost::new();
        fake.fail("svc restart");
        running_containerd(&fake);
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/config.toml")
                .attr("content", "version = 2")
                .notifies("restart", "service[containerd]", "immediately"),
            Declaration::new("service", "containerd").action("start"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Changed, Status::Skipped]);
        assert_eq!(report.notifications[0].status, Status::Failed);
        assert_eq!(report.exit_code(false), 1);
        let (target, _) = report.first_failure().unwrap();
        assert_eq!(target, &ResourceId::new(Kind::Service, "containerd"));
    }

    #[test]
    fn test_failed_immediate_notification_reports_remaining_edges() {
        let fake = FakeHost::new();
        fake.fail("svc restart");
        running_containerd(&fake);
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/config.toml")
                .attr("content", "version = 2")
                .notifies("restart", "service[containerd]", "immediately")
                .notifies("run", "execute[daemon_reload]", "delayed"),
            Declaration::new("service", "containerd").action("start"),
            Declaration::new("execute", "daemon_reload")
                .action("nothing")
                .attr("command", "systemctl daemon-reload"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(report.notifications.len(), 2);
        assert_eq!(report.notifications[0].status, Status::Failed);
        let rest = &report.notifications[1];
        assert_eq!(rest.edge.target, ResourceId::new(Kind::Execute, "daemon_reload"));
        assert_eq!(rest.status, Status::Skipped);
        assert_eq!(
            rest.skip_reason,
            Some(SkipReason::Halted {
                after: ResourceId::new(Kind::Service, "containerd")
            })
        );
        assert!(fake.log_position("sh systemctl daemon-reload").is_none());
    }

    #[test]
    fn test_stop_then_start_requeries_after_each_change() {
        let fake = FakeHost::new();
        running_containerd(&fake);
        let plan = compile(&[Declaration::new("service", "containerd")
            .action("stop")
            .action("start")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(statuses(&report), vec![Status::Changed]);
        assert_eq!(report.outcomes[0].applied, vec![Action::Stop, Action::Start]);
        let stop = fake.log_position("svc stop containerd").unwrap();
        let start = fake.log_position("svc start containerd").unwrap();
        assert!(stop < start);
        assert!(fake.state().services["containerd"].running);
    }

    #[test]
    fn test_converged_actions_before_first_change_are_not_requeried() {
        let fake = FakeHost::new();
        fake.state().services.insert(
            "containerd".to_string(),
            ServiceStatus {
                enabled: true,
                running: false,
            },
        );
        let plan = compile(&[Declaration::new("service", "containerd")
            .action("enable")
            .action("start")]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(report.outcomes[0].applied, vec![Action::Start]);
        let queries = fake
            .log()
            .iter()
            .filter(|entry| entry.as_str() == "svc status containerd")
            .count();
        assert_eq!(queries, 2);
    }

    #[test]
    fn test_notification_respects_target_guard() {
        let fake = FakeHost::new();
        let plan = compile(&[
            Declaration::new("execute", "reload")
                .action("nothing")
                .attr("command", "systemctl daemon-reload")
                .attr("not_if", true),
            Declaration::new("file", "/etc/systemd/system/kubelet.service.d/10.conf")
                .attr("content", "[Service]")
                .notifies("run", "execute[reload]", "immediate"),
        ]);

        let report = Engine::new(fake.host()).run_simple(&plan);
        assert_eq!(report.notifications[0].status, Status::Skipped);
        assert!(!fake.log().contains(&"sh systemctl daemon-reload".to_string()));
    }

    #[test]
    fn test_progress_callback_order() {
        let fake = FakeHost::new();
        running_containerd(&fake);
        let plan = compile(&[
            Declaration::new("file", "/etc/containerd/config.toml")
                .attr("content", "version = 2")
                .notifies("restart", "service[containerd]", "immediately"),
            Declaration::new("service", "containerd").action("start"),
        ]);

        let mut recorder = Recorder::default();
        Engine::new(fake.host()).run(&plan, &mut recorder);
        assert_eq!(
            recorder.events,
            vec![
                "start 2",
                "begin file[/etc/containerd/config.toml]",
                "changed file[/etc/containerd/config.toml]",
                "notify service[containerd] changed",
                "begin service[containerd]",
                "unchanged service[containerd]",
            ]
        );
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let fake = FakeHost::new();
        fake.state().modules.insert("overlay".to_string());
        fake.set_command_exit("swapon -s | grep -q /dev", 1);
        let plan = compile(&[
            Declaration::new("kernel_module", "overlay"),
            Declaration::new("file", "/etc/modules-load.d/br_netfilter.conf").attr("content", "br_netfilter"),
            Declaration::new("execute", "turn_off_swap")
                .attr("command", "swapoff -a")
                .attr("only_if", "swapon -s | grep -q /dev"),
        ]);

        let entries = Engine::new(fake.host()).plan(&plan);
        assert_eq!(entries[0].status, PlanStatus::Converged);
        match &entries[1].status {
            PlanStatus::WouldChange(changes) => {
                assert_eq!(changes[0].action, Action::Create);
                assert!(changes[0].observation.current.is_absent());
            }
            other => panic!("expected WouldChange, got {other:?}"),
        }
        assert!(matches!(entries[2].status, PlanStatus::Skipped(SkipReason::Guard { .. })));
        assert!(fake.file("/etc/modules-load.d/br_netfilter.conf").is_none());
        assert!(!fake.log().iter().any(|e| e.starts_with("fs write") || e.starts_with("kmod load")));
    }
}
