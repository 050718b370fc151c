use crate::cluster::ClusterSession;
use crate::config::OperatorConfig;
use crate::engine::{self, Decision, Observation};
use crate::metrics;
use crate::models::{ImageRef, RegistryKind, VersioningHandler};
use crate::net::ConnectivityProbe;
use crate::notify::{Notification, NotificationSink, Severity};
use crate::registry::{DockerHubAdapter, GitLabAdapter, RegistryAdapter, RegistryError};
use crate::version;
use anyhow::Result;
use chrono::NaiveDateTime;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::{WatchStreamExt, watcher, watcher::Event};
use kube::{Api, Client, ResourceExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Everything a tick needs, shared by all handler tasks.
pub struct TickContext {
    pub client: Client,
    pub config: OperatorConfig,
    pub sink: NotificationSink,
    pub probe: Arc<ConnectivityProbe>,
}

/// Start the handler supervisor: a watch over VersioningHandlers that keeps
/// one recurring reconciliation task alive per resource.
pub async fn start(client: Client, config: OperatorConfig) -> Result<JoinHandle<()>> {
    let probe = Arc::new(ConnectivityProbe::new(config.refresh_frequency));
    let sink = NotificationSink::new(&config, probe.clone());
    let context = Arc::new(TickContext {
        client: client.clone(),
        config,
        sink,
        probe,
    });

    let supervisor = HandlerSupervisor::new(client, context);
    Ok(tokio::spawn(supervisor.run()))
}

struct HandlerSupervisor {
    client: Client,
    context: Arc<TickContext>,
    tasks: HashMap<String, JoinHandle<()>>,
}

impl HandlerSupervisor {
    fn new(client: Client, context: Arc<TickContext>) -> Self {
        Self {
            client,
            context,
            tasks: HashMap::new(),
        }
    }

    async fn run(mut self) {
        info!("Handler supervisor starting");

        let handlers: Api<VersioningHandler> = Api::all(self.client.clone());
        let stream = watcher(handlers, watcher::Config::default()).default_backoff();
        let mut stream = std::pin::pin!(stream);

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(handler)) => self.upsert(handler, "apply").await,
                Ok(Event::InitApply(handler)) => self.upsert(handler, "resume").await,
                Ok(Event::Delete(handler)) => self.remove(handler).await,
                Ok(Event::Init) | Ok(Event::InitDone) => {},
                Err(e) => warn!("handler watch error: {}", e),
            }
        }

        info!("Handler supervisor stopped");
    }

    /// (Re)schedule the recurring tick task for a handler and journal the
    /// lifecycle event. Cancelling the previous task means a tick in flight
    /// for the old spec stops at its next await point.
    async fn upsert(&mut self, handler: VersioningHandler, origin: &str) {
        let key = task_key(&handler);
        let existed = self
            .tasks
            .remove(&key)
            .map(|task| task.abort())
            .is_some();

        let event = match (existed, origin) {
            (true, _) => "on_update",
            (false, "resume") => "on_resume",
            (false, _) => "on_create",
        };
        self.journal(&handler, event).await;

        let context = self.context.clone();
        let task = tokio::spawn(run_handler_loop(context, Arc::new(handler)));
        self.tasks.insert(key, task);
    }

    async fn remove(&mut self, handler: VersioningHandler) {
        if let Some(task) = self.tasks.remove(&task_key(&handler)) {
            task.abort();
        }
        self.journal(&handler, "on_delete").await;
    }

    async fn journal(&self, handler: &VersioningHandler, event: &str) {
        let name = handler.name_any();
        let namespace = handler.namespace().unwrap_or_else(|| "default".to_string());
        let uid = handler.uid().unwrap_or_default();

        let verb = match event {
            "on_create" => "Created",
            "on_update" => "Updated",
            "on_resume" => "Resumed",
            _ => "Deleted",
        };
        let notification = Notification::new(
            format!("[{}] - Versioning handler: {}", event, name),
            format!(
                "{} handler {} in namespace {} with uid {} \n Watching deployment: {}",
                verb, name, namespace, uid, handler.spec.deployment
            ),
            Severity::Info,
        );

        self.context
            .sink
            .emit(
                &handler_id(handler),
                &format!("handler/{}", name),
                event,
                notification,
            )
            .await;
    }
}

fn task_key(handler: &VersioningHandler) -> String {
    handler.uid().unwrap_or_else(|| handler.name_any())
}

/// Identifier of the handler's dedupe journal file.
fn handler_id(handler: &VersioningHandler) -> String {
    format!(
        "{}.{}",
        handler.namespace().unwrap_or_else(|| "default".to_string()),
        handler.name_any()
    )
}

/// The recurring per-handler job. The first tick fires immediately; a tick
/// that overruns the interval delays the next one instead of queueing it.
async fn run_handler_loop(context: Arc<TickContext>, handler: Arc<VersioningHandler>) {
    let mut interval = tokio::time::interval(context.config.refresh_frequency);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        metrics::RECONCILE_TICKS_TOTAL.inc();

        if let Err(e) = run_tick(&context, &handler).await {
            metrics::RECONCILE_ERRORS.inc();
            error!(
                handler = %handler.name_any(),
                "reconciliation tick failed: {:#}",
                e
            );
        }
    }
}

/// One reconciliation pass for one handler: reachability, spec validation,
/// cluster session, then discover-decide-act-notify per container. Errors
/// inside the container loop are converted to notifications; only setup
/// failures bubble up.
async fn run_tick(context: &TickContext, handler: &VersioningHandler) -> Result<()> {
    let handler_name = handler.name_any();
    let handler_id = handler_id(handler);

    if !context.probe.is_online().await {
        context
            .sink
            .emit(
                &handler_id,
                "internet",
                "no_internet_connection",
                Notification::new(
                    "[No internet] - Registry checks skipped",
                    "No internet connection is available; image versions cannot be checked this tick",
                    Severity::Warning,
                ),
            )
            .await;
        return Ok(());
    }

    let kind: RegistryKind = match handler.spec.containerregistry.parse() {
        Ok(kind) => kind,
        Err(e) => {
            context
                .sink
                .emit(
                    &handler_id,
                    &format!("handler/{}", handler_name),
                    "invalid_handler_spec",
                    Notification::new(
                        format!("[Invalid spec] - Versioning handler: {}", handler_name),
                        format!("{} \n Supported values: dockerhub, gitlab", e),
                        Severity::Critical,
                    ),
                )
                .await;
            return Ok(());
        },
    };

    debug!(
        handler = %handler_name,
        registry = %kind,
        deployment = %handler.spec.deployment,
        "starting reconciliation tick"
    );

    let session = ClusterSession::connect(context.client.clone()).await?;
    let namespaces = session.non_system_namespaces().await?;

    let scope = TickScope {
        context,
        session: &session,
        handler_id: &handler_id,
        dockerhub: DockerHubAdapter::new()?,
        gitlab: match context.config.gitlab.clone() {
            Some(config) => Some(GitLabAdapter::new(config)?),
            None => None,
        },
    };

    for namespace in namespaces {
        let deployments = match scope.session.deployments(&namespace).await {
            Ok(deployments) => deployments,
            Err(e) => {
                warn!("skipping namespace {}: {:#}", namespace, e);
                continue;
            },
        };

        for deployment in deployments {
            if deployment.name_any() != handler.spec.deployment {
                continue;
            }
            metrics::DEPLOYMENTS_SCANNED.inc();
            scope.process_deployment(&namespace, &deployment).await;
        }
    }

    Ok(())
}

struct TickScope<'a> {
    context: &'a TickContext,
    session: &'a ClusterSession,
    handler_id: &'a str,
    dockerhub: DockerHubAdapter,
    gitlab: Option<GitLabAdapter>,
}

impl TickScope<'_> {
    async fn process_deployment(&self, namespace: &str, deployment: &Deployment) {
        let deployment_name = deployment.name_any();
        let containers = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .map(|template| template.containers.as_slice())
            .unwrap_or_default();

        for container in containers {
            let Some(raw_image) = container.image.as_deref() else {
                continue;
            };
            self.process_container(namespace, &deployment_name, &container.name, raw_image)
                .await;
        }
    }

    /// Observed -> Decided -> Acted -> Notified, for one container. Every
    /// failure ends in a dedupe-gated notification; nothing escapes.
    async fn process_container(
        &self,
        namespace: &str,
        deployment: &str,
        container: &str,
        raw_image: &str,
    ) {
        metrics::IMAGES_CHECKED.inc();

        let image = ImageRef::parse(raw_image);
        let image_id = image.to_string();
        let current_tag = image.tag.clone();

        let adapter: &dyn RegistryAdapter = if image.is_gitlab() {
            match &self.gitlab {
                Some(adapter) => adapter,
                None => {
                    // An unconfigured GitLab adapter means "no images", not
                    // an error; nothing propagates.
                    debug!(
                        image = %image_id,
                        "skipping GitLab-hosted image, registry credentials not configured"
                    );
                    return;
                },
            }
        } else {
            &self.dockerhub
        };

        let registry_namespace = match adapter.resolve_namespace(&image).await {
            Ok(namespace) => namespace,
            Err(e) => return self.emit_registry_error(&image, &image_id, &e).await,
        };

        let candidates = match adapter
            .list_candidate_tags(&registry_namespace, &image, &current_tag)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => return self.emit_registry_error(&image, &image_id, &e).await,
        };

        let latest_overall = version::latest_overall(&candidates.names);
        let latest_auto = version::latest_auto_updatable(
            &current_tag,
            &candidates,
            self.context.config.versions_frontier,
        );

        let (current_date, latest_date) = if image.is_gitlab() {
            (None, None)
        } else {
            self.dockerhub_dates(adapter, &registry_namespace, &image, &current_tag)
                .await
        };

        let decision = engine::decide(&Observation {
            current_tag: &current_tag,
            latest_auto_updatable: &latest_auto,
            latest_overall: &latest_overall,
            current_date,
            latest_date,
            latest_preference: self.context.config.latest_preference,
        });

        debug!(
            image = %image_id,
            ?decision,
            latest_auto = %latest_auto,
            latest_overall = %latest_overall,
            "decision computed"
        );

        match &decision {
            Decision::UpdateTo(tag) => {
                let new_ref = image.with_tag(tag);
                if let Err(e) = self
                    .session
                    .patch_image_tag(namespace, deployment, container, &new_ref)
                    .await
                {
                    return self
                        .emit_cluster_failure(&image_id, deployment, "cluster_patch_failed", &e)
                        .await;
                }
                metrics::UPDATES_APPLIED.inc();
            },
            Decision::Restart => {
                if let Err(e) = self.session.restart_rollout(namespace, deployment).await {
                    return self
                        .emit_cluster_failure(&image_id, deployment, "cluster_restart_failed", &e)
                        .await;
                }
                metrics::RESTARTS_TRIGGERED.inc();
            },
            Decision::NotifyOnly => metrics::UPDATES_NOTIFY_ONLY.inc(),
            Decision::NoAction => {},
        }

        self.notify_outcome(
            namespace,
            deployment,
            &image,
            &image_id,
            &current_tag,
            &latest_auto,
            &latest_overall,
            &decision,
        )
        .await;
    }

    /// DockerHub exposes publish dates; fetch them for the running tag and
    /// for `latest` so the engine can spot a fresh `latest` push.
    async fn dockerhub_dates(
        &self,
        adapter: &dyn RegistryAdapter,
        registry_namespace: &str,
        image: &ImageRef,
        current_tag: &str,
    ) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let current = adapter
            .tag_timestamp(registry_namespace, image, current_tag)
            .await
            .ok();
        let latest = adapter
            .tag_timestamp(registry_namespace, image, "latest")
            .await
            .ok();
        (current, latest)
    }

    async fn emit_registry_error(&self, image: &ImageRef, image_id: &str, error: &RegistryError) {
        metrics::REGISTRY_ERRORS.inc();
        let severity = match error {
            RegistryError::AbnormalResponse(_) => Severity::Error,
            _ => Severity::Warning,
        };
        self.context
            .sink
            .emit(
                self.handler_id,
                image_id,
                error.log_id(),
                Notification::new(
                    format!("[Registry error] - Image: {}", image.name),
                    error.to_string(),
                    severity,
                ),
            )
            .await;
    }

    async fn emit_cluster_failure(
        &self,
        image_id: &str,
        deployment: &str,
        log_id: &str,
        error: &anyhow::Error,
    ) {
        self.context
            .sink
            .emit(
                self.handler_id,
                image_id,
                log_id,
                Notification::new(
                    format!("[Cluster error] - Deployment: {}", deployment),
                    format!("{:#}", error),
                    Severity::Error,
                ),
            )
            .await;
    }

    /// The human-facing journal of what happened to one container this tick,
    /// in the shape operators already read from the stdout log.
    #[allow(clippy::too_many_arguments)]
    async fn notify_outcome(
        &self,
        namespace: &str,
        deployment: &str,
        image: &ImageRef,
        image_id: &str,
        current_tag: &str,
        latest_auto: &str,
        latest_overall: &str,
        decision: &Decision,
    ) {
        let (action, log_id, updated) = match decision {
            Decision::UpdateTo(tag) if tag == latest_overall => (
                format!("Updated image to latest overall version, {}", tag),
                format!("updated_to_{}", tag),
                true,
            ),
            Decision::UpdateTo(tag) => (
                format!("Updated image to latest updatable version, {}", tag),
                format!("updated_to_{}", tag),
                true,
            ),
            Decision::Restart => (
                "Restarted deployment to pull the fresh latest image".to_string(),
                "restarted_latest".to_string(),
                true,
            ),
            Decision::NotifyOnly => (
                format!(
                    "Did not update image. Version {} crosses the version frontier and needs manual review",
                    latest_overall
                ),
                format!("notify_{}", latest_overall),
                false,
            ),
            Decision::NoAction => (
                "Did not update image.".to_string(),
                "up_to_date".to_string(),
                false,
            ),
        };

        let subject = format!(
            "[{}] - Image: {} - Deployment: {}",
            if updated { "Update!" } else { "No update!" },
            image.name,
            deployment
        );
        let message = format!(
            "- Image: {} \n - Deployment: {} with namespace {} \n \
             - Previous version: {} \n - Latest updatable version: {} \n \
             - Latest overall version: {} \n \n - Action made: {}",
            image.name, deployment, namespace, current_tag, latest_auto, latest_overall, action
        );
        let severity = match decision {
            Decision::NotifyOnly => Severity::Warning,
            _ => Severity::Info,
        };

        self.context
            .sink
            .emit(
                self.handler_id,
                image_id,
                &log_id,
                Notification::new(subject, message, severity),
            )
            .await;
    }
}
