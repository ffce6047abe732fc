//! Job compilation and execution.
//!
//! Takes the resolver's job graphs the last mile: compiles each job into a
//! concrete command-line spec, dispatches it through a scheduler adapter,
//! and commits results to the cache and the data repository. Repositories,
//! schedulers, and software environments are all trait seams, so the same
//! engine runs against a local process pool or a cluster queue.

pub mod compile;
pub mod driver;
pub mod environment;
pub mod error;
pub mod local;
pub mod repository;
pub mod scheduler;

pub use self::{
    compile::{
        CompileError, CompiledJob, CompiledOutput, CompiledStep, JobCompiler, JobSpec, StagedValue,
    },
    driver::ExecutionDriver,
    environment::{EnvironmentError, EnvironmentResolver, StaticEnvironment},
    error::{ExecuteError, FailedJob, PipelineExecutionError},
    local::LocalScheduler,
    repository::{DirectoryRepository, RepositoryAdapter, RepositoryError},
    scheduler::{
        JobHandle, SchedulerAdapter, SchedulerConfig, SchedulerError, SchedulerJobStatus,
    },
};
