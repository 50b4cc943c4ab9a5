use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sbom_harvest_core::config::{DirectoryConfig, HarvestConfig, PipelineConfig};
use sbom_harvest_core::contract::{
    Cloner, HttpReply, LoginRequest, MockCloner, MockRepositoryApi, MockSbomGenerator,
    MockTrackingService, Project, RepositoryApi, SbomGenerator, Team, ToolError,
    TrackingService,
};
use sbom_harvest_core::descriptor::{
    PipelineState, RepositoryDescriptor, RepositoryRecord, SkipReason, WorkSet,
    LANGUAGE_NOT_SPECIFIED,
};
use sbom_harvest_core::error::{
    DiscoveryError, SetupError, StageError, SynchroniseError, TransportError,
};
use sbom_harvest_core::session::PipelineCredentials;
use sbom_harvest_core::synchronise::{synchronise, Orchestrator};
use sbom_harvest_core::worker::{Collaborators, Pipeline};
use tempfile::{tempdir, TempDir};

const SBOM: &str = r#"{"bomFormat":"CycloneDX","specVersion":"1.5"}"#;

fn record(name: &str, language: Option<&str>) -> RepositoryRecord {
    RepositoryRecord {
        name: name.to_string(),
        html_url: format!("https://github.com/acme/{name}"),
        contributors_url: format!("https://api.github.com/repos/acme/{name}/contributors"),
        language: language.map(str::to_string),
        archived: None,
        disabled: None,
    }
}

fn work_set(names: &[&str]) -> WorkSet {
    let now = Utc::now();
    names
        .iter()
        .map(|name| RepositoryDescriptor::from_record(record(name, Some("Go")), now))
        .collect()
}

fn credentials() -> PipelineCredentials {
    PipelineCredentials {
        session_token: "session-token".to_string(),
        upload_token: "upload-token".to_string(),
        team_id: "team-1".to_string(),
    }
}

fn pipeline_config(dir: &TempDir, worker_limit: usize) -> PipelineConfig {
    PipelineConfig {
        working_dir: dir.path().to_path_buf(),
        worker_limit,
        ..Default::default()
    }
}

fn collaborators(
    api: MockRepositoryApi,
    tracking: MockTrackingService,
    cloner: impl Cloner + 'static,
    generator: impl SbomGenerator + 'static,
) -> Collaborators {
    Collaborators {
        repository_api: Arc::new(api),
        tracking: Arc::new(tracking),
        cloner: Arc::new(cloner),
        generator: Arc::new(generator),
    }
}

fn contributors_ok(calls: usize) -> MockRepositoryApi {
    let mut api = MockRepositoryApi::new();
    api.expect_get_contributors()
        .times(calls)
        .returning(|_| Ok(HttpReply::new(200, "[]")));
    api
}

fn cloner_ok(calls: usize) -> MockCloner {
    let mut cloner = MockCloner::new();
    cloner
        .expect_clone_repository()
        .times(calls)
        .returning(|_, _| Ok(()));
    cloner
}

fn generator_ok(calls: usize) -> MockSbomGenerator {
    let mut generator = MockSbomGenerator::new();
    generator
        .expect_generate()
        .times(calls)
        .returning(|_| Ok(SBOM.to_string()));
    generator
}

fn project_created(project: &Project) -> HttpReply {
    let body = serde_json::json!({
        "id": format!("project-{}", project.name),
        "name": project.name,
        "codebases": [{ "id": format!("codebase-{}", project.name), "name": project.name }],
    });
    HttpReply::new(200, body.to_string())
}

/// Registration and upload succeed `calls` times each.
fn tracking_ok(calls: usize) -> MockTrackingService {
    let mut tracking = MockTrackingService::new();
    tracking
        .expect_create_project()
        .times(calls)
        .returning(|_, _, project| Ok(project_created(project)));
    tracking
        .expect_upload_sbom()
        .times(calls)
        .returning(|_, _, _, _, _| {
            Ok(HttpReply::new(
                200,
                r#"{"valid":true,"s3BucketName":"sboms","s3ObjectKey":"key"}"#,
            ))
        });
    tracking
}

fn expect_session(tracking: &mut MockTrackingService) {
    tracking
        .expect_login()
        .times(1)
        .returning(|_| Ok(HttpReply::new(200, r#"{"token":"session-token"}"#)));
    tracking.expect_create_team().times(1).returning(|_, team| {
        let body = serde_json::json!({
            "id": "team-1",
            "name": team.name,
            "tokens": [{ "id": "t1", "name": "sbom", "token": "upload-token" }],
        });
        Ok(HttpReply::new(200, body.to_string()))
    });
}

fn login_request() -> LoginRequest {
    LoginRequest {
        username: "harvester".to_string(),
        password: "hunter2".to_string(),
    }
}

fn harvest_config(dir: &TempDir, repo: Option<&str>) -> HarvestConfig {
    HarvestConfig {
        org: "acme".to_string(),
        repo: repo.map(str::to_string),
        directory: DirectoryConfig::default(),
        pipeline: pipeline_config(dir, 4),
    }
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    let mut cloner = MockCloner::new();
    cloner
        .expect_clone_repository()
        .times(5)
        .returning(|address, _| {
            if address.contains("/repo-2.git") {
                Err("fatal: repository not found".into())
            } else {
                Ok(())
            }
        });

    let pipeline = Pipeline::new(
        collaborators(contributors_ok(5), tracking_ok(4), cloner, generator_ok(4)),
        pipeline_config(&dir, 2),
    );
    let outcome = Orchestrator::new(pipeline)
        .run(
            work_set(&["repo-0", "repo-1", "repo-2", "repo-3", "repo-4"]),
            &credentials(),
        )
        .await;

    let names: Vec<_> = outcome.work_set.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["repo-0", "repo-1", "repo-2", "repo-3", "repo-4"]);

    let err = outcome.error.expect("one failure aggregated");
    assert_eq!(err.len(), 1);
    assert_eq!(err.failures[0].0, "repo-2");
    assert!(matches!(&err.failures[0].1, StageError::Clone(msg) if msg.contains("repository not found")));

    let uploaded = outcome
        .work_set
        .iter()
        .filter(|d| d.state == PipelineState::Uploaded)
        .count();
    assert_eq!(uploaded, 4);
    assert_eq!(outcome.work_set[0].project_id.as_deref(), Some("project-repo-0"));
    assert_eq!(outcome.work_set[0].status_code, Some(200));
}

#[tokio::test]
async fn failed_probe_skips_every_later_stage() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_get_contributors()
        .times(1)
        .returning(|_| Ok(HttpReply::new(502, "bad gateway")));

    let pipeline = Pipeline::new(
        collaborators(api, tracking_ok(0), cloner_ok(0), generator_ok(0)),
        pipeline_config(&dir, 1),
    );
    let outcome = Orchestrator::new(pipeline)
        .run(work_set(&["widget"]), &credentials())
        .await;

    let only = &outcome.work_set[0];
    assert!(matches!(only.error(), Some(StageError::Probe(_))));
    assert_eq!(outcome.error.map(|e| e.len()), Some(1));
}

#[tokio::test]
async fn empty_repository_ends_without_error() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_get_contributors()
        .times(1)
        .returning(|_| Ok(HttpReply::new(204, "")));

    let pipeline = Pipeline::new(
        collaborators(api, tracking_ok(0), cloner_ok(0), generator_ok(0)),
        pipeline_config(&dir, 1),
    );
    let outcome = Orchestrator::new(pipeline)
        .run(work_set(&["widget"]), &credentials())
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.work_set[0].state, PipelineState::Empty);
    assert!(outcome.work_set[0].is_empty);
}

#[tokio::test]
async fn blank_sbom_fails_generation_before_registration() {
    let dir = tempdir().unwrap();
    let mut generator = MockSbomGenerator::new();
    generator
        .expect_generate()
        .times(1)
        .returning(|_| Ok("  \n".to_string()));

    let pipeline = Pipeline::new(
        collaborators(contributors_ok(1), tracking_ok(0), cloner_ok(1), generator),
        pipeline_config(&dir, 1),
    );
    let outcome = Orchestrator::new(pipeline)
        .run(work_set(&["widget"]), &credentials())
        .await;

    assert!(matches!(
        outcome.work_set[0].error(),
        Some(StageError::Generate(msg)) if msg.contains("empty SBOM")
    ));
}

#[tokio::test]
async fn policy_filters_run_before_any_stage() {
    let dir = tempdir().unwrap();
    let now = Utc::now();
    let mut archived = record("archived", Some("Go"));
    archived.archived = Some(true);
    let mut disabled = record("disabled", Some("Python"));
    disabled.disabled = Some(true);
    let items = vec![
        RepositoryDescriptor::from_record(record("untyped", None), now),
        RepositoryDescriptor::from_record(record("rusty", Some("Rust")), now),
        RepositoryDescriptor::from_record(archived, now),
        RepositoryDescriptor::from_record(disabled, now),
    ];

    let pipeline = Pipeline::new(
        collaborators(contributors_ok(0), tracking_ok(0), cloner_ok(0), generator_ok(0)),
        pipeline_config(&dir, 2),
    );
    let outcome = Orchestrator::new(pipeline).run(items, &credentials()).await;

    assert!(outcome.error.is_none());
    let states: Vec<_> = outcome.work_set.iter().map(|d| d.state.clone()).collect();
    assert_eq!(
        states,
        vec![
            PipelineState::Skipped(SkipReason::UnsupportedLanguage(
                LANGUAGE_NOT_SPECIFIED.to_string()
            )),
            PipelineState::Skipped(SkipReason::UnsupportedLanguage("Rust".to_string())),
            PipelineState::Skipped(SkipReason::Archived),
            PipelineState::Skipped(SkipReason::Disabled),
        ]
    );
}

/// Creates the destination the way `git clone` would.
struct MkdirCloner;

#[async_trait]
impl Cloner for MkdirCloner {
    async fn clone_repository(&self, _: &str, destination: &Path) -> Result<(), ToolError> {
        tokio::fs::create_dir_all(destination).await?;
        Ok(())
    }
}

#[tokio::test]
async fn local_clone_is_removed_unless_kept() {
    let dir = tempdir().unwrap();

    for keep_clones in [false, true] {
        let name = format!("keep-{keep_clones}");
        let config = PipelineConfig {
            keep_clones,
            ..pipeline_config(&dir, 1)
        };
        let pipeline = Pipeline::new(
            collaborators(contributors_ok(1), tracking_ok(1), MkdirCloner, generator_ok(1)),
            config,
        );
        let outcome = Orchestrator::new(pipeline)
            .run(work_set(&[name.as_str()]), &credentials())
            .await;

        assert!(outcome.error.is_none());
        assert_eq!(dir.path().join(&name).exists(), keep_clones);
    }
}

/// Tracks how many items sit between the contributors lookup and the upload.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Opens the gauge at the contributors lookup.
struct GaugedApi(Arc<Gauge>);

#[async_trait]
impl RepositoryApi for GaugedApi {
    async fn list_repositories_page(
        &self,
        _: &str,
        _: u32,
        _: u32,
    ) -> Result<HttpReply, TransportError> {
        Err(TransportError::new("repos", "not served"))
    }

    async fn get_repository(&self, _: &str, repo: &str) -> Result<HttpReply, TransportError> {
        Err(TransportError::new(repo, "not served"))
    }

    async fn get_contributors(&self, _: &str) -> Result<HttpReply, TransportError> {
        self.0.enter();
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(HttpReply::new(200, "[]"))
    }
}

/// Closes the gauge once an item's SBOM is uploaded.
struct GaugedTracking(Arc<Gauge>);

#[async_trait]
impl TrackingService for GaugedTracking {
    async fn login(&self, _: &LoginRequest) -> Result<HttpReply, TransportError> {
        Err(TransportError::new("login", "not served"))
    }

    async fn create_team(&self, _: &str, _: &Team) -> Result<HttpReply, TransportError> {
        Err(TransportError::new("team", "not served"))
    }

    async fn create_project(
        &self,
        _: &str,
        _: &str,
        project: &Project,
    ) -> Result<HttpReply, TransportError> {
        Ok(project_created(project))
    }

    async fn upload_sbom(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<HttpReply, TransportError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.0.leave();
        Ok(HttpReply::new(
            200,
            r#"{"valid":true,"s3BucketName":"sboms","s3ObjectKey":"key"}"#,
        ))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_items_never_exceed_worker_limit() {
    let dir = tempdir().unwrap();
    let gauge = Arc::new(Gauge::default());
    let names: Vec<String> = (0..24).map(|i| format!("repo-{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let pipeline = Pipeline::new(
        Collaborators {
            repository_api: Arc::new(GaugedApi(Arc::clone(&gauge))),
            tracking: Arc::new(GaugedTracking(Arc::clone(&gauge))),
            cloner: Arc::new(cloner_ok(24)),
            generator: Arc::new(generator_ok(24)),
        },
        pipeline_config(&dir, 3),
    );
    let orchestrator = Orchestrator::new(pipeline);
    assert_eq!(orchestrator.worker_limit(), 3);

    let outcome = orchestrator.run(work_set(&names), &credentials()).await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.work_set.len(), 24);
    assert!(outcome
        .work_set
        .iter()
        .all(|d| d.state == PipelineState::Uploaded));
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded the limit");
    assert!(peak > 1, "items never overlapped");
}

/// Panics for one repository to simulate a crashing worker.
struct PanickingGenerator {
    victim: &'static str,
}

#[async_trait]
impl SbomGenerator for PanickingGenerator {
    async fn generate(&self, source_path: &Path) -> Result<String, ToolError> {
        if source_path.ends_with(self.victim) {
            panic!("generator crashed on {}", self.victim);
        }
        Ok(SBOM.to_string())
    }
}

#[tokio::test]
async fn panicking_worker_releases_its_slot() {
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(
        collaborators(
            contributors_ok(3),
            tracking_ok(2),
            cloner_ok(3),
            PanickingGenerator { victim: "first" },
        ),
        pipeline_config(&dir, 1),
    );
    let outcome = Orchestrator::new(pipeline)
        .run(work_set(&["first", "second", "third"]), &credentials())
        .await;

    assert!(matches!(outcome.work_set[0].error(), Some(StageError::Worker(_))));
    assert_eq!(outcome.work_set[1].state, PipelineState::Uploaded);
    assert_eq!(outcome.work_set[2].state, PipelineState::Uploaded);
    assert_eq!(outcome.error.map(|e| e.len()), Some(1));
}

#[tokio::test]
async fn panicking_worker_leaves_no_clone_behind() {
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(
        collaborators(
            contributors_ok(1),
            tracking_ok(0),
            MkdirCloner,
            PanickingGenerator { victim: "widget" },
        ),
        pipeline_config(&dir, 1),
    );
    let outcome = Orchestrator::new(pipeline)
        .run(work_set(&["widget"]), &credentials())
        .await;

    assert!(matches!(outcome.work_set[0].error(), Some(StageError::Worker(_))));
    assert!(!dir.path().join("widget").exists());
}

#[test]
fn zero_worker_limit_still_admits_one_item() {
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(
        collaborators(contributors_ok(0), tracking_ok(0), cloner_ok(0), generator_ok(0)),
        pipeline_config(&dir, 0),
    );
    assert_eq!(Orchestrator::new(pipeline).worker_limit(), 1);
}

#[tokio::test]
async fn synchronise_reports_statistics_for_the_whole_work_set() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_list_repositories_page()
        .times(1)
        .returning(|_, _, _| {
            let body = serde_json::json!([
                record("api", Some("Go")),
                record("docs", None),
                record("web", Some("TypeScript")),
            ]);
            Ok(HttpReply::new(200, body.to_string()))
        });
    api.expect_get_contributors()
        .times(2)
        .returning(|_| Ok(HttpReply::new(200, "[]")));

    let mut tracking = tracking_ok(2);
    expect_session(&mut tracking);

    let report = synchronise(
        &harvest_config(&dir, None),
        &login_request(),
        collaborators(api, tracking, cloner_ok(2), generator_ok(2)),
    )
    .await
    .expect("run should succeed");

    assert_eq!(report.team.id, "team-1");
    assert!(report.team.name.starts_with("acme-"));
    assert!(report.error.is_none());
    assert_eq!(report.success_count(), 2);
    assert_eq!(report.statistics.total, 3);
    assert_eq!(report.statistics.languages.get(LANGUAGE_NOT_SPECIFIED), Some(&1));
    assert_eq!(report.statistics.languages.get("Go"), Some(&1));
    assert!(matches!(report.work_set[1].state, PipelineState::Skipped(_)));

    let summary = report.to_string();
    assert!(summary.contains("3 total, 2 uploaded"));
}

#[tokio::test]
async fn multi_repository_failures_do_not_fail_the_run() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_list_repositories_page().returning(|_, _, _| {
        let body = serde_json::json!([record("api", Some("Go")), record("web", Some("Go"))]);
        Ok(HttpReply::new(200, body.to_string()))
    });
    api.expect_get_contributors().returning(|url| {
        let status = if url.contains("/web/") { 500 } else { 200 };
        Ok(HttpReply::new(status, "[]"))
    });

    let mut tracking = tracking_ok(1);
    expect_session(&mut tracking);

    let report = synchronise(
        &harvest_config(&dir, None),
        &login_request(),
        collaborators(api, tracking, cloner_ok(1), generator_ok(1)),
    )
    .await
    .expect("multi-repository run succeeds despite item failures");

    let err = report.error.as_ref().expect("failure reported");
    assert_eq!(err.len(), 1);
    assert_eq!(report.failures()[0].name, "web");
    assert_eq!(report.statistics.errored, 1);
}

#[tokio::test]
async fn single_repository_failure_fails_the_run() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_list_repositories_page().times(0);
    api.expect_get_repository()
        .withf(|org, repo| org == "acme" && repo == "widget")
        .times(1)
        .returning(|_, _| {
            let body = serde_json::to_string(&record("widget", Some("Go"))).unwrap();
            Ok(HttpReply::new(200, body))
        });
    api.expect_get_contributors()
        .returning(|_| Ok(HttpReply::new(200, "[]")));

    let mut tracking = MockTrackingService::new();
    expect_session(&mut tracking);
    tracking
        .expect_create_project()
        .returning(|_, _, project| Ok(project_created(project)));
    tracking
        .expect_upload_sbom()
        .times(1)
        .returning(|_, _, _, _, _| Ok(HttpReply::new(500, "")));

    let result = synchronise(
        &harvest_config(&dir, Some("widget")),
        &login_request(),
        collaborators(api, tracking, cloner_ok(1), generator_ok(1)),
    )
    .await;

    match result {
        Err(SynchroniseError::Repository(err)) => {
            assert_eq!(err.len(), 1);
            assert!(matches!(&err.failures[0].1, StageError::Upload(_)));
        }
        other => panic!("expected promoted repository error, got {other:?}"),
    }
}

#[tokio::test]
async fn no_repositories_is_fatal() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_list_repositories_page()
        .times(1)
        .returning(|_, _, _| Ok(HttpReply::new(200, "[]")));

    let mut tracking = MockTrackingService::new();
    expect_session(&mut tracking);

    let result = synchronise(
        &harvest_config(&dir, None),
        &login_request(),
        collaborators(api, tracking, cloner_ok(0), generator_ok(0)),
    )
    .await;

    assert!(matches!(
        result,
        Err(SynchroniseError::Discovery(DiscoveryError::NoRepositories { org })) if org == "acme"
    ));
}

#[tokio::test]
async fn setup_failure_aborts_before_discovery() {
    let dir = tempdir().unwrap();
    let mut api = MockRepositoryApi::new();
    api.expect_list_repositories_page().times(0);

    let mut tracking = MockTrackingService::new();
    tracking
        .expect_login()
        .returning(|_| Ok(HttpReply::new(500, "")));
    tracking.expect_create_team().times(0);

    let result = synchronise(
        &harvest_config(&dir, None),
        &login_request(),
        collaborators(api, tracking, cloner_ok(0), generator_ok(0)),
    )
    .await;

    assert!(matches!(
        result,
        Err(SynchroniseError::Setup(SetupError::Login(_)))
    ));
}
