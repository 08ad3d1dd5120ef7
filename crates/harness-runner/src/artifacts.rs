//! Deterministic local paths and remote URLs for a dataset configuration.

use crate::config::SizeLabel;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactRole {
    DatasetOrig,
    Dataset,
    QueryOrig,
    Query,
}

impl ArtifactRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactRole::DatasetOrig => "dataset_orig",
            ArtifactRole::Dataset => "dataset",
            ArtifactRole::QueryOrig => "query_orig",
            ArtifactRole::Query => "query",
        }
    }
}

/// One downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub logical_name: String,
    pub local_dir: PathBuf,
    pub file_name: String,
    pub remote_url: String,
}

impl ArtifactSpec {
    pub fn local_path(&self) -> PathBuf {
        self.local_dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetBundle {
    pub dataset_orig: ArtifactSpec,
    pub dataset: ArtifactSpec,
    pub query_orig: ArtifactSpec,
    pub query: ArtifactSpec,
}

impl DatasetBundle {
    pub fn get(&self, role: ArtifactRole) -> &ArtifactSpec {
        match role {
            ArtifactRole::DatasetOrig => &self.dataset_orig,
            ArtifactRole::Dataset => &self.dataset,
            ArtifactRole::QueryOrig => &self.query_orig,
            ArtifactRole::Query => &self.query,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactRole, &ArtifactSpec)> {
        [
            ArtifactRole::DatasetOrig,
            ArtifactRole::Dataset,
            ArtifactRole::QueryOrig,
            ArtifactRole::Query,
        ]
        .into_iter()
        .map(move |role| (role, self.get(role)))
    }

    /// Artifacts with distinct local paths, in role order. Aliased roles
    /// collapse onto the first role that names the path.
    pub fn distinct(&self) -> Vec<&ArtifactSpec> {
        let mut seen = BTreeSet::new();
        self.iter()
            .filter(|(_, spec)| seen.insert(spec.local_path()))
            .map(|(_, spec)| spec)
            .collect()
    }

    /// Stem shared by the engine's output files, `<dataset file>_<query file>`.
    fn output_stem(&self) -> String {
        format!("{}_{}", self.dataset_orig.file_name, self.query_orig.file_name)
    }
}

pub fn dataset_file_name(kind: &str, size: SizeLabel) -> String {
    format!("laion2B-en-{}-n={}.h5", kind, size.as_str())
}

pub fn query_file_name(kind: &str) -> String {
    format!("private-queries-gold-10k-{}.h5", kind)
}

/// Maps `(root, kind, size)` to the four dataset roles. Pure path computation.
pub fn resolve(root: &Path, kind: &str, size: SizeLabel, base_url: &str) -> DatasetBundle {
    let dataset_dir = root.join("Dataset").join("Dataset");
    let query_dir = root.join("Dataset").join("Query");
    let base_url = base_url.trim_end_matches('/');
    let spec = |role: ArtifactRole, dir: &Path, file_name: String| ArtifactSpec {
        logical_name: role.as_str().to_string(),
        local_dir: dir.to_path_buf(),
        remote_url: format!("{}/{}", base_url, file_name),
        file_name,
    };
    DatasetBundle {
        dataset_orig: spec(ArtifactRole::DatasetOrig, &dataset_dir, dataset_file_name(kind, size)),
        dataset: spec(ArtifactRole::Dataset, &dataset_dir, dataset_file_name(kind, size)),
        query_orig: spec(ArtifactRole::QueryOrig, &query_dir, query_file_name(kind)),
        query: spec(ArtifactRole::Query, &query_dir, query_file_name(kind)),
    }
}

/// Where the engine leaves its output, and where the harness publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub side_channel: PathBuf,
    pub engine_result: PathBuf,
    pub archived_result: PathBuf,
    pub container: PathBuf,
}

impl RunPaths {
    pub fn derive(
        root: &Path,
        output_dir: &Path,
        bundle: &DatasetBundle,
        kind: &str,
        size: SizeLabel,
        algorithm: &str,
    ) -> Self {
        let stem = bundle.output_stem();
        let engine_results = root.join("Result");
        Self {
            side_channel: engine_results.join(format!("{}_run_params.csv", stem)),
            engine_result: engine_results.join(format!("{}.csv", stem)),
            archived_result: output_dir.join(format!("{}.csv", stem)),
            container: output_dir
                .join(kind)
                .join(size.as_str())
                .join(format!("{}.h5", algorithm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.org/SISAP23-Challenge";

    #[test]
    fn resolve_is_deterministic_and_aliases_roles() {
        let root = PathBuf::from("/data/Similarity_search");
        let a = resolve(&root, "clip768v2", SizeLabel::S300K, URL);
        let b = resolve(&root, "clip768v2", SizeLabel::S300K, URL);
        assert_eq!(a, b);
        assert_eq!(
            a.dataset.local_path(),
            root.join("Dataset/Dataset/laion2B-en-clip768v2-n=300K.h5")
        );
        assert_eq!(a.dataset_orig.local_path(), a.dataset.local_path());
        assert_eq!(
            a.query.local_path(),
            root.join("Dataset/Query/private-queries-gold-10k-clip768v2.h5")
        );
        assert_eq!(a.query_orig.local_path(), a.query.local_path());
        assert_eq!(
            a.query.remote_url,
            "https://example.org/SISAP23-Challenge/private-queries-gold-10k-clip768v2.h5"
        );
        assert_eq!(a.dataset_orig.logical_name, "dataset_orig");
    }

    #[test]
    fn distinct_collapses_aliased_paths() {
        let bundle = resolve(Path::new("root"), "clip768v2", SizeLabel::S100K, &format!("{}/", URL));
        let distinct = bundle.distinct();
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].logical_name, "dataset_orig");
        assert_eq!(distinct[1].logical_name, "query_orig");
        assert!(distinct[0].remote_url.starts_with(URL));
        assert!(!distinct[0].remote_url.contains("//laion"));
    }

    #[test]
    fn run_paths_follow_layout() {
        let root = Path::new("Similarity_search");
        let out = Path::new("result");
        let bundle = resolve(root, "clip768v2", SizeLabel::S10M, URL);
        let paths = RunPaths::derive(root, out, &bundle, "clip768v2", SizeLabel::S10M, "CRANBERRY");
        let stem = "laion2B-en-clip768v2-n=10M.h5_private-queries-gold-10k-clip768v2.h5";
        assert_eq!(
            paths.side_channel,
            root.join("Result").join(format!("{}_run_params.csv", stem))
        );
        assert_eq!(paths.engine_result, root.join("Result").join(format!("{}.csv", stem)));
        assert_eq!(paths.archived_result, out.join(format!("{}.csv", stem)));
        assert_eq!(paths.container, PathBuf::from("result/clip768v2/10M/CRANBERRY.h5"));
    }
}
