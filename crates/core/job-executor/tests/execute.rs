//! End-to-end execution against a directory repository and the local
//! scheduler.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use dep_resolver::{JobStatus, Resolver, SkipReason};
use job_executor::{
    DirectoryRepository, ExecuteError, ExecutionDriver, JobCompiler, JobHandle, JobSpec,
    LocalScheduler, RepositoryAdapter as _, SchedulerAdapter, SchedulerError, SchedulerJobStatus,
    StaticEnvironment,
};
use pipeline_graph::{CommandTemplate, Node, Pipeline, PipelineSet};
use provenance_cache::{CacheStore, MemoryCacheStore};
use study_common::{Frequency, ItemName, ScopeKey, SubjectId, VisitId};
use study_spec::{DataSpec, Registry};
use tokio_util::sync::CancellationToken;

fn item(name: &str) -> ItemName {
    name.parse().expect("valid name")
}

fn subject() -> SubjectId {
    "PILOT1".parse().expect("valid subject")
}

fn visit() -> VisitId {
    "FIRST".parse().expect("valid visit")
}

fn session() -> ScopeKey {
    ScopeKey::Session {
        subject: subject(),
        visit: visit(),
    }
}

fn registry() -> Registry {
    Registry::builder()
        .data_spec(DataSpec::acquired_fileset(
            item("acquired_file1"),
            "text".parse().expect("valid format"),
            Frequency::PerSession,
        ))
        .data_spec(DataSpec::derived_fileset(
            item("derived_file1"),
            "text".parse().expect("valid format"),
            Frequency::PerSession,
            "pipeline1".parse().expect("valid name"),
        ))
        .data_spec(DataSpec::derived_fileset(
            item("derived_file2"),
            "text".parse().expect("valid format"),
            Frequency::PerSession,
            "pipeline2".parse().expect("valid name"),
        ))
        .build()
        .expect("valid registry")
}

fn copy_pipeline(name: &str, input: &str, output: &str) -> Pipeline {
    let input = item(input);
    let output = item(output);
    let node_input = input.clone();
    let node_output = output.clone();
    Pipeline::new(name.parse().expect("valid name"), move |ctx| {
        ctx.add_node(
            Node::new(
                "node1",
                CommandTemplate::new(["cp", "{input:in}", "{output:out}"]),
            )
            .input_item("in", node_input.clone())
            .output_item("out", node_output.clone()),
        );
        Ok(())
    })
    .input(input)
    .output(output)
}

fn failing_pipeline(name: &str, input: &str, output: &str) -> Pipeline {
    let input = item(input);
    let output = item(output);
    let node_input = input.clone();
    let node_output = output.clone();
    Pipeline::new(name.parse().expect("valid name"), move |ctx| {
        ctx.add_node(
            Node::new("node1", CommandTemplate::new(["false"]))
                .input_item("in", node_input.clone())
                .output_item("out", node_output.clone()),
        );
        Ok(())
    })
    .input(input)
    .output(output)
}

fn slow_pipeline(name: &str, input: &str, output: &str) -> Pipeline {
    let input = item(input);
    let output = item(output);
    let node_input = input.clone();
    let node_output = output.clone();
    Pipeline::new(name.parse().expect("valid name"), move |ctx| {
        ctx.add_node(
            Node::new("node1", CommandTemplate::new(["sleep", "600"]))
                .input_item("in", node_input.clone())
                .output_item("out", node_output.clone()),
        );
        Ok(())
    })
    .input(input)
    .output(output)
}

/// Local scheduler that counts submissions.
#[derive(Default)]
struct CountingScheduler {
    inner: LocalScheduler,
    submissions: AtomicUsize,
}

#[async_trait]
impl SchedulerAdapter for CountingScheduler {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, SchedulerError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(spec).await
    }

    async fn poll(&self, handle: &JobHandle) -> Result<SchedulerJobStatus, SchedulerError> {
        self.inner.poll(handle).await
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), SchedulerError> {
        self.inner.cancel(handle).await
    }
}

async fn seed_acquired(repo: &DirectoryRepository, content: &str) {
    let dir = repo.scope_dir(&session());
    tokio::fs::create_dir_all(&dir).await.expect("create dirs");
    tokio::fs::write(dir.join("acquired_file1.text"), content)
        .await
        .expect("seed acquired item");
}

#[tokio::test]
async fn two_stage_pipeline_runs_to_completion() {
    //* Given
    let repo_root = tempfile::tempdir().expect("tempdir");
    let work_dir = tempfile::tempdir().expect("tempdir");
    let repository = DirectoryRepository::new(repo_root.path());
    seed_acquired(&repository, "zero one two\n").await;

    let registry = registry();
    let pipelines = PipelineSet::new(vec![
        copy_pipeline("pipeline1", "acquired_file1", "derived_file1"),
        copy_pipeline("pipeline2", "derived_file1", "derived_file2"),
    ])
    .expect("valid pipeline set");
    let cache = MemoryCacheStore::new();
    let environment = StaticEnvironment::new();
    let scheduler = LocalScheduler::default();

    let mut graph = Resolver::new(&registry, &pipelines, &cache)
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves");

    //* When
    let compiler = JobCompiler::new(
        &registry,
        &repository,
        &cache,
        &environment,
        work_dir.path(),
    );
    let results = ExecutionDriver::new(&scheduler, &repository, &cache, compiler)
        .run(&mut graph)
        .await
        .expect("run succeeds");

    //* Then
    assert!(
        graph
            .jobs()
            .iter()
            .all(|j| j.status() == JobStatus::Succeeded)
    );
    let (path, _) = results[0].as_fileset().expect("fileset result");
    let content = tokio::fs::read_to_string(path)
        .await
        .expect("result file exists");
    assert_eq!(content, "zero one two\n");

    // Final results are written back into the repository as well
    let written_back = repository
        .fetch(&item("derived_file2"), &session())
        .await
        .expect("write-back present");
    assert!(written_back.as_fileset().is_some());
}

#[tokio::test]
async fn rerun_is_served_from_the_cache() {
    //* Given
    let repo_root = tempfile::tempdir().expect("tempdir");
    let work_dir = tempfile::tempdir().expect("tempdir");
    let repository = DirectoryRepository::new(repo_root.path());
    seed_acquired(&repository, "zero one two\n").await;

    let registry = registry();
    let pipelines = PipelineSet::new(vec![
        copy_pipeline("pipeline1", "acquired_file1", "derived_file1"),
        copy_pipeline("pipeline2", "derived_file1", "derived_file2"),
    ])
    .expect("valid pipeline set");
    let cache = MemoryCacheStore::new();
    let environment = StaticEnvironment::new();
    let scheduler = LocalScheduler::default();
    let resolver = Resolver::new(&registry, &pipelines, &cache);

    let mut first = resolver
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves");
    let compiler = JobCompiler::new(
        &registry,
        &repository,
        &cache,
        &environment,
        work_dir.path(),
    );
    let driver = ExecutionDriver::new(&scheduler, &repository, &cache, compiler);
    let first_results = driver.run(&mut first).await.expect("first run succeeds");

    //* When
    let mut second = resolver
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves again");
    let second_results = driver.run(&mut second).await.expect("second run succeeds");

    //* Then
    // The demanded item's producer is already cached; nothing runs.
    assert!(
        second
            .jobs()
            .iter()
            .all(|j| j.status() == JobStatus::Skipped(SkipReason::Cached))
    );
    assert_eq!(first_results, second_results);
}

#[tokio::test]
async fn failure_skips_downstream_and_reports_unresolved_items() {
    //* Given
    let repo_root = tempfile::tempdir().expect("tempdir");
    let work_dir = tempfile::tempdir().expect("tempdir");
    let repository = DirectoryRepository::new(repo_root.path());
    seed_acquired(&repository, "zero one two\n").await;

    let registry = registry();
    let pipelines = PipelineSet::new(vec![
        failing_pipeline("pipeline1", "acquired_file1", "derived_file1"),
        copy_pipeline("pipeline2", "derived_file1", "derived_file2"),
    ])
    .expect("valid pipeline set");
    let cache = MemoryCacheStore::new();
    let environment = StaticEnvironment::new();
    let scheduler = LocalScheduler::default();

    let mut graph = Resolver::new(&registry, &pipelines, &cache)
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves");

    //* When
    let compiler = JobCompiler::new(
        &registry,
        &repository,
        &cache,
        &environment,
        work_dir.path(),
    );
    let err = ExecutionDriver::new(&scheduler, &repository, &cache, compiler)
        .run(&mut graph)
        .await
        .expect_err("run must fail");

    //* Then
    let ExecuteError::Execution(execution) = err else {
        panic!("expected execution error, got {err}");
    };
    assert_eq!(execution.failed.len(), 1);
    assert_eq!(execution.failed[0].pipeline.as_str(), "pipeline1");
    assert!(execution.unresolved.contains(&item("derived_file1")));
    assert!(execution.unresolved.contains(&item("derived_file2")));

    let downstream = graph
        .jobs()
        .iter()
        .find(|j| j.pipeline().as_str() == "pipeline2")
        .expect("downstream job present");
    assert_eq!(
        downstream.status(),
        JobStatus::Skipped(SkipReason::FailedDependency)
    );
}

#[tokio::test]
async fn concurrent_runs_submit_each_job_at_most_once() {
    //* Given
    let repo_root = tempfile::tempdir().expect("tempdir");
    let work_dir = tempfile::tempdir().expect("tempdir");
    let repository = DirectoryRepository::new(repo_root.path());
    seed_acquired(&repository, "zero one two\n").await;

    let registry = registry();
    let pipelines = PipelineSet::new(vec![
        copy_pipeline("pipeline1", "acquired_file1", "derived_file1"),
        copy_pipeline("pipeline2", "derived_file1", "derived_file2"),
    ])
    .expect("valid pipeline set");
    let cache = MemoryCacheStore::new();
    let environment = StaticEnvironment::new();
    let scheduler = CountingScheduler::default();
    let resolver = Resolver::new(&registry, &pipelines, &cache);

    // Both graphs resolve before either runs, so each carries the same two
    // pending jobs.
    let mut graph_a = resolver
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves");
    let mut graph_b = resolver
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves");

    let compiler_a = JobCompiler::new(
        &registry,
        &repository,
        &cache,
        &environment,
        work_dir.path(),
    );
    let compiler_b = JobCompiler::new(
        &registry,
        &repository,
        &cache,
        &environment,
        work_dir.path(),
    );
    let driver_a = ExecutionDriver::new(&scheduler, &repository, &cache, compiler_a);
    let driver_b = ExecutionDriver::new(&scheduler, &repository, &cache, compiler_b);

    //* When
    let (results_a, results_b) = tokio::join!(driver_a.run(&mut graph_a), driver_b.run(&mut graph_b));

    //* Then
    let results_a = results_a.expect("first run succeeds");
    let results_b = results_b.expect("second run succeeds");
    assert_eq!(results_a, results_b);

    // Two distinct jobs exist; whichever driver loses the claim race serves
    // them from the cache instead of resubmitting.
    assert_eq!(scheduler.submissions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_stops_outstanding_jobs_and_keeps_committed_entries() {
    //* Given
    let repo_root = tempfile::tempdir().expect("tempdir");
    let work_dir = tempfile::tempdir().expect("tempdir");
    let repository = DirectoryRepository::new(repo_root.path());
    seed_acquired(&repository, "zero one two\n").await;

    let registry = registry();
    let pipelines = PipelineSet::new(vec![
        copy_pipeline("pipeline1", "acquired_file1", "derived_file1"),
        slow_pipeline("pipeline2", "derived_file1", "derived_file2"),
    ])
    .expect("valid pipeline set");
    let cache = MemoryCacheStore::new();
    let environment = StaticEnvironment::new();
    let scheduler = LocalScheduler::default();
    let token = CancellationToken::new();

    let mut graph = Resolver::new(&registry, &pipelines, &cache)
        .resolve(&item("derived_file2"), &subject(), &visit())
        .await
        .expect("resolves");

    let compiler = JobCompiler::new(
        &registry,
        &repository,
        &cache,
        &environment,
        work_dir.path(),
    );
    let driver = ExecutionDriver::new(&scheduler, &repository, &cache, compiler)
        .with_cancellation(token.clone());

    //* When the first stage has committed, cancel the run
    let canceller = async {
        loop {
            let committed = cache.history(&item("derived_file1")).await.expect("history");
            if !committed.is_empty() {
                token.cancel();
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let (run, ()) = tokio::join!(driver.run(&mut graph), canceller);

    //* Then
    let err = run.expect_err("run must be cancelled");
    assert!(matches!(err, ExecuteError::Cancelled));

    let stage1 = graph
        .jobs()
        .iter()
        .find(|j| j.pipeline().as_str() == "pipeline1")
        .expect("first stage present");
    let stage2 = graph
        .jobs()
        .iter()
        .find(|j| j.pipeline().as_str() == "pipeline2")
        .expect("second stage present");
    assert_eq!(stage1.status(), JobStatus::Succeeded);
    assert_eq!(stage2.status(), JobStatus::Cancelled);

    // The committed first stage survives the cancellation
    let history = cache.history(&item("derived_file1")).await.expect("history");
    assert_eq!(history.len(), 1);

    // The withdrawn job's output claim was released
    let output = &stage2.outputs()[0];
    let claimable = cache
        .claim(&output.item, &output.scope, stage2.fingerprint())
        .await
        .expect("claim");
    assert!(claimable);
}
