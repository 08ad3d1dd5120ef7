use crate::artifacts::{resolve, DatasetBundle, RunPaths};
use crate::config::{HarnessConfig, RunRequest, SizeLabel};
use crate::decode::decode;
use crate::engine::{Engine, EngineInvocation};
use crate::error::{HarnessError, StoreError};
use crate::fetch::Fetcher;
use crate::store::{ResultRecord, ResultStore};
use chrono::{DateTime, Utc};
use harness_core::{ensure_parent_dir, sha256_file};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result_path: PathBuf,
    pub raw_result_path: PathBuf,
    pub algorithm: String,
    pub kind: String,
    pub size: SizeLabel,
    pub k: usize,
    pub build_index: bool,
    pub build_time: f64,
    pub query_time: f64,
    pub params: String,
    pub engine_wall_seconds: f64,
    pub engine_stdout_lines: usize,
    /// Trailing lines of the engine's stdout.
    pub engine_stdout_tail: String,
    pub queries: usize,
    pub neighbors_per_query: usize,
    pub sha256: String,
    pub finished_at: DateTime<Utc>,
}

/// Resolve, fetch, run the engine, decode, store. One configuration per call,
/// every stage strictly after the previous one.
pub struct Harness<E, S> {
    config: HarnessConfig,
    engine: E,
    store: S,
}

impl<E: Engine, S: ResultStore> Harness<E, S> {
    pub fn new(config: HarnessConfig, engine: E, store: S) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            store,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn bundle(&self, size: SizeLabel) -> DatasetBundle {
        resolve(
            &self.config.root_folder,
            &self.config.kind,
            size,
            &self.config.dataset_url,
        )
    }

    pub fn paths(&self, bundle: &DatasetBundle, size: SizeLabel) -> RunPaths {
        RunPaths::derive(
            &self.config.root_folder,
            &self.config.output_dir,
            bundle,
            &self.config.kind,
            size,
            &self.config.algorithm,
        )
    }

    pub fn run(&self, request: &RunRequest) -> Result<RunReport, HarnessError> {
        let bundle = self.bundle(request.size);
        let paths = self.paths(&bundle, request.size);
        info!(kind = %self.config.kind, size = %request.size, k = request.k, "resolved dataset");

        let fetcher = Fetcher::new()?;
        fetcher.ensure_bundle(&bundle)?;

        let invocation = EngineInvocation {
            dataset_orig_path: bundle.dataset_orig.local_path(),
            dataset_path: bundle.dataset.local_path(),
            query_orig_path: bundle.query_orig.local_path(),
            query_path: bundle.query.local_path(),
            size: request.size,
            build_index: request.build_index,
            k: request.k,
        };
        let output = self.engine.run(&invocation)?;
        info!(
            secs = output.elapsed.as_secs_f64(),
            stdout_lines = output.stdout_lines,
            "engine done"
        );
        for line in output.stdout.lines() {
            info!(target: "engine::stdout", "{}", line);
        }

        archive_raw_result(&paths)?;
        let (metadata, matrices) = decode(&paths.side_channel, &paths.archived_result)?;
        info!(
            buildtime = metadata.build_time,
            querytime = metadata.query_time,
            params = %metadata.params,
            "run metadata"
        );
        if matrices.neighbors_per_query() != request.k {
            warn!(
                requested = request.k,
                emitted = matrices.neighbors_per_query(),
                "engine emitted a different neighbor count than requested"
            );
        }

        let record = ResultRecord {
            algorithm: &self.config.algorithm,
            kind: &self.config.kind,
            size: request.size,
            metadata: &metadata,
            matrices: &matrices,
        };
        self.store.write(&paths.container, &record)?;
        let sha256 = sha256_file(&paths.container).map_err(StoreError::from)?;
        info!(path = %paths.container.display(), "result published");

        Ok(RunReport {
            result_path: paths.container,
            raw_result_path: paths.archived_result,
            algorithm: self.config.algorithm.clone(),
            kind: self.config.kind.clone(),
            size: request.size,
            k: request.k,
            build_index: request.build_index,
            build_time: metadata.build_time,
            query_time: metadata.query_time,
            params: metadata.params,
            engine_wall_seconds: output.elapsed.as_secs_f64(),
            engine_stdout_lines: output.stdout_lines,
            engine_stdout_tail: output.stdout,
            queries: matrices.queries(),
            neighbors_per_query: matrices.neighbors_per_query(),
            sha256,
            finished_at: Utc::now(),
        })
    }
}

/// Keeps a copy of the engine's raw result text next to the containers.
fn archive_raw_result(paths: &RunPaths) -> Result<(), HarnessError> {
    let archive_err = |source| HarnessError::Archive {
        path: paths.engine_result.clone(),
        source,
    };
    ensure_parent_dir(&paths.archived_result).map_err(archive_err)?;
    info!(
        from = %paths.engine_result.display(),
        to = %paths.archived_result.display(),
        "archiving raw result file"
    );
    fs::copy(&paths.engine_result, &paths.archived_result).map_err(archive_err)?;
    Ok(())
}
