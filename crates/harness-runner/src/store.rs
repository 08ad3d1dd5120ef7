//! Persistence of decoded results into the attribute-tagged result container.

use crate::config::SizeLabel;
use crate::decode::{ResultMatrices, RunMetadata};
use crate::error::StoreError;
use std::path::Path;

/// Everything that ends up in one result container.
#[derive(Debug, Clone)]
pub struct ResultRecord<'a> {
    pub algorithm: &'a str,
    pub kind: &'a str,
    pub size: SizeLabel,
    pub metadata: &'a RunMetadata,
    pub matrices: &'a ResultMatrices,
}

impl ResultRecord<'_> {
    pub fn check_shape(&self) -> Result<(), StoreError> {
        let knns = self.matrices.knns.shape();
        let dists = self.matrices.dists.shape();
        if knns != dists {
            return Err(StoreError::Invalid(format!(
                "knns shape {:?} does not match dists shape {:?}",
                knns, dists
            )));
        }
        Ok(())
    }
}

/// Writes a complete container to `path`, replacing whatever was there.
/// Implementations must never leave a partial file at `path`.
pub trait ResultStore {
    fn write(&self, path: &Path, record: &ResultRecord<'_>) -> Result<(), StoreError>;
}

#[cfg(feature = "hdf5")]
pub use self::h5::Hdf5Store;

#[cfg(feature = "hdf5")]
mod h5 {
    use super::{ResultRecord, ResultStore};
    use crate::error::StoreError;
    use harness_core::publish_atomically;
    use hdf5::types::VarLenUnicode;
    use hdf5::File;
    use std::path::Path;
    use tracing::info;

    /// HDF5 layout read by the scoring tools: datasets `knns` (i64) and
    /// `dists` (f64), scalar attributes `algo`, `data`, `buildtime`,
    /// `querytime`, `size`, `params`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Hdf5Store;

    fn write_str_attr(file: &File, name: &str, value: &str) -> Result<(), StoreError> {
        let value: VarLenUnicode = value
            .parse()
            .map_err(|e| StoreError::Invalid(format!("attribute {}: {}", name, e)))?;
        file.new_attr::<VarLenUnicode>()
            .shape(())
            .create(name)?
            .write_scalar(&value)?;
        Ok(())
    }

    fn write_f64_attr(file: &File, name: &str, value: f64) -> Result<(), StoreError> {
        file.new_attr::<f64>()
            .shape(())
            .create(name)?
            .write_scalar(&value)?;
        Ok(())
    }

    fn contiguous<'a, T>(data: Option<&'a [T]>, name: &str) -> Result<&'a [T], StoreError> {
        data.ok_or_else(|| StoreError::Invalid(format!("{} is not contiguous", name)))
    }

    impl ResultStore for Hdf5Store {
        fn write(&self, path: &Path, record: &ResultRecord<'_>) -> Result<(), StoreError> {
            record.check_shape()?;
            let shape = [record.matrices.queries(), record.matrices.neighbors_per_query()];
            publish_atomically::<StoreError, _>(path, "tmp", |tmp| {
                let file = File::create(tmp)?;
                write_str_attr(&file, "algo", record.algorithm)?;
                write_str_attr(&file, "data", record.kind)?;
                write_f64_attr(&file, "buildtime", record.metadata.build_time)?;
                write_f64_attr(&file, "querytime", record.metadata.query_time)?;
                write_str_attr(&file, "size", record.size.as_str())?;
                write_str_attr(&file, "params", &record.metadata.params)?;

                // Row-major views; copies only if a matrix is not already contiguous.
                let knns = record.matrices.knns.as_standard_layout();
                file.new_dataset::<i64>()
                    .shape(shape)
                    .create("knns")?
                    .write_raw(contiguous(knns.as_slice(), "knns")?)?;
                let dists = record.matrices.dists.as_standard_layout();
                file.new_dataset::<f64>()
                    .shape(shape)
                    .create("dists")?
                    .write_raw(contiguous(dists.as_slice(), "dists")?)?;
                file.close()?;
                Ok(())
            })?;
            info!(path = %path.display(), queries = shape[0], k = shape[1], "result container written");
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::config::SizeLabel;
        use crate::decode::{parse_results, RunMetadata};
        use hdf5::types::{FloatSize, IntSize, TypeDescriptor};

        fn read_str(file: &File, name: &str) -> String {
            file.attr(name)
                .expect("attr")
                .read_scalar::<VarLenUnicode>()
                .expect("string attr")
                .as_str()
                .to_string()
        }

        #[test]
        fn writes_datasets_and_attributes_with_exact_dtypes() {
            let dir = std::env::temp_dir().join(format!(
                "harness_h5_{}_{}",
                std::process::id(),
                chrono::Utc::now().timestamp_micros()
            ));
            let path = dir.join("clip768v2").join("100K").join("CRANBERRY.h5");
            let matrices = parse_results("3:0.5;7:1.2\n1:0.0;9:9.9")
                .expect("decode")
                .expect("rows");
            let metadata = RunMetadata {
                build_time: 12.5,
                query_time: 0.75,
                params: "ef=64".to_string(),
            };
            let record = ResultRecord {
                algorithm: "CRANBERRY",
                kind: "clip768v2",
                size: SizeLabel::S100K,
                metadata: &metadata,
                matrices: &matrices,
            };
            std::fs::create_dir_all(path.parent().expect("parent")).expect("dirs");
            std::fs::write(&path, b"stale container").expect("stale file");
            Hdf5Store.write(&path, &record).expect("write container");

            let file = File::open(&path).expect("open container");
            assert_eq!(read_str(&file, "algo"), "CRANBERRY");
            assert_eq!(read_str(&file, "data"), "clip768v2");
            assert_eq!(read_str(&file, "size"), "100K");
            assert_eq!(read_str(&file, "params"), "ef=64");
            let build: f64 = file.attr("buildtime").expect("attr").read_scalar().expect("f64");
            let query: f64 = file.attr("querytime").expect("attr").read_scalar().expect("f64");
            assert_eq!((build, query), (12.5, 0.75));

            let knns = file.dataset("knns").expect("knns");
            let dists = file.dataset("dists").expect("dists");
            assert_eq!(knns.shape(), vec![2, 2]);
            assert_eq!(dists.shape(), vec![2, 2]);
            assert_eq!(
                knns.dtype().expect("dtype").to_descriptor().expect("descriptor"),
                TypeDescriptor::Integer(IntSize::U8)
            );
            assert_eq!(
                dists.dtype().expect("dtype").to_descriptor().expect("descriptor"),
                TypeDescriptor::Float(FloatSize::U8)
            );
            assert_eq!(knns.read_raw::<i64>().expect("ids"), vec![3, 7, 1, 9]);
            assert_eq!(dists.read_raw::<f64>().expect("dists"), vec![0.5, 1.2, 0.0, 9.9]);
            drop(file);
            let _ = std::fs::remove_dir_all(dir);
        }

        #[test]
        fn column_major_matrices_are_written_row_major() {
            use crate::decode::ResultMatrices;
            use ndarray::{Array2, ShapeBuilder};

            let dir = std::env::temp_dir().join(format!(
                "harness_h5_fortran_{}_{}",
                std::process::id(),
                chrono::Utc::now().timestamp_micros()
            ));
            let path = dir.join("CRANBERRY.h5");
            let matrices = ResultMatrices {
                knns: Array2::from_shape_vec((2, 2).f(), vec![3i64, 1, 7, 9]).expect("knns"),
                dists: Array2::from_shape_vec((2, 2).f(), vec![0.5, 0.0, 1.2, 9.9]).expect("dists"),
            };
            assert!(matrices.knns.as_slice().is_none(), "fixture must be column-major");
            let metadata = RunMetadata {
                build_time: 1.0,
                query_time: 2.0,
                params: String::new(),
            };
            let record = ResultRecord {
                algorithm: "CRANBERRY",
                kind: "clip768v2",
                size: SizeLabel::S300K,
                metadata: &metadata,
                matrices: &matrices,
            };
            Hdf5Store.write(&path, &record).expect("write container");

            let file = File::open(&path).expect("open container");
            let knns = file.dataset("knns").expect("knns");
            assert_eq!(knns.read_raw::<i64>().expect("ids"), vec![3, 7, 1, 9]);
            let dists = file.dataset("dists").expect("dists");
            assert_eq!(dists.read_raw::<f64>().expect("dists"), vec![0.5, 1.2, 0.0, 9.9]);
            assert_eq!(read_str(&file, "params"), "");
            drop(file);
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
