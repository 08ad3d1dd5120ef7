//! Benchmark harness driver: fetches the dataset, runs the external ANN
//! engine, and converts its raw output into an HDF5 result container.

pub mod artifacts;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod harness;
pub mod store;

pub use artifacts::{resolve, ArtifactRole, ArtifactSpec, DatasetBundle, RunPaths};
pub use config::{EngineConfig, HarnessConfig, RunRequest, SizeLabel};
pub use decode::{decode, ResultMatrices, RunMetadata};
pub use engine::{Engine, EngineInvocation, EngineOutput, JavaEngine};
pub use error::{ConfigError, DecodeError, EngineError, FetchError, HarnessError, StoreError};
pub use fetch::{FetchOutcome, Fetcher};
pub use harness::{Harness, RunReport};
#[cfg(feature = "hdf5")]
pub use store::Hdf5Store;
pub use store::{ResultRecord, ResultStore};

/// Runs one configuration with the JVM engine and the HDF5 store.
#[cfg(feature = "hdf5")]
pub fn run_benchmark(config: HarnessConfig, request: &RunRequest) -> Result<RunReport, HarnessError> {
    let engine = JavaEngine::new(config.engine.clone());
    Harness::new(config, engine, Hdf5Store)?.run(request)
}
