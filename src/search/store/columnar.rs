//! Parquet codec for the vector store.
//!
//! One row per chunk. The vector column is a `FixedSizeList<Float32, D>`;
//! `D`, the model id and the normalization flag travel as schema metadata.

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, ListArray, RecordBatch,
    StringArray, UInt64Array, UInt8Array,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Chunk, Collection, EmbeddingRecord, StoreMetadata, StoreStats};
use crate::error::{Error, Result};

const FORMAT_VERSION: &str = "1";

const META_FORMAT_VERSION: &str = "docrag.format_version";
const META_DIMENSION: &str = "docrag.dimension";
const META_MODEL: &str = "docrag.embedding_model";
const META_NORMALIZED: &str = "docrag.normalized";
const META_CREATED_AT: &str = "docrag.created_at";

/// Store file on disk. Writes are whole-file and atomic; loads are full.
pub struct ParquetStore {
    path: PathBuf,
}

/// Width of the `FixedSizeList` vector column.
fn list_width(dimension: usize) -> Result<i32> {
    i32::try_from(dimension).map_err(|_| {
        Error::InvalidArgument(format!(
            "store dimension {} exceeds the column width limit",
            dimension
        ))
    })
}

/// Arrow schema of the store file.
pub fn records_schema(metadata: &StoreMetadata) -> Result<Schema> {
    let width = list_width(metadata.dimension)?;
    let mut kv = HashMap::new();
    kv.insert(META_FORMAT_VERSION.to_string(), FORMAT_VERSION.to_string());
    kv.insert(META_DIMENSION.to_string(), metadata.dimension.to_string());
    kv.insert(META_MODEL.to_string(), metadata.model.clone());
    kv.insert(META_NORMALIZED.to_string(), metadata.normalized.to_string());
    if let Some(created_at) = metadata.created_at {
        kv.insert(META_CREATED_AT.to_string(), created_at.to_rfc3339());
    }

    Ok(Schema::new_with_metadata(
        vec![
            Field::new("id", DataType::UInt64, false),
            Field::new("heading", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, true),
            Field::new("depth", DataType::UInt8, false),
            Field::new(
                "parents",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    width,
                ),
                false,
            ),
        ],
        kv,
    ))
}

impl ParquetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Serialize every record, replacing any previous file in one rename.
    pub fn write(&self, records: &[EmbeddingRecord], metadata: &StoreMetadata) -> Result<()> {
        let dim = metadata.dimension;
        if dim == 0 {
            return Err(Error::InvalidArgument("store dimension must be positive".into()));
        }
        for (position, record) in records.iter().enumerate() {
            if record.vector.len() != dim {
                return Err(Error::InvalidArgument(format!(
                    "record {} has {} values, store dimension is {}",
                    position,
                    record.vector.len(),
                    dim
                )));
            }
            if record.chunk.id != position as u64 {
                return Err(Error::InvalidArgument(format!(
                    "record at position {} has id {}",
                    position, record.chunk.id
                )));
            }
        }

        let batch = to_batch(records, metadata)?;
        self.atomic_write(&batch)?;

        info!(
            "Saved {} records (dimension {}) to {}",
            records.len(),
            dim,
            self.path.display()
        );
        Ok(())
    }

    fn atomic_write(&self, batch: &RecordBatch) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("parquet.tmp");
        let written = write_parquet(&temp_path, batch);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(())
    }

    /// Read the whole file into an independent in-memory collection.
    pub fn load(&self) -> Result<Collection> {
        let file = File::open(&self.path)
            .map_err(|e| Error::corrupt(&self.path, format!("cannot open: {e}")))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::corrupt(&self.path, format!("not a parquet file: {e}")))?;
        let kv = builder.schema().metadata().clone();
        let reader = builder
            .build()
            .map_err(|e| Error::corrupt(&self.path, e.to_string()))?;

        let declared_dim = match kv.get(META_DIMENSION) {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                Error::corrupt(&self.path, format!("bad {META_DIMENSION} '{raw}'"))
            })?),
            None => None,
        };

        let mut records = Vec::new();
        let mut dim = declared_dim;
        for batch in reader {
            let batch = batch.map_err(|e| Error::corrupt(&self.path, e.to_string()))?;
            self.decode_batch(&batch, &mut dim, &mut records)?;
        }

        let dim = dim.unwrap_or(0);
        if dim == 0 && !records.is_empty() {
            return Err(Error::corrupt(&self.path, "vector width is zero"));
        }

        let metadata = StoreMetadata {
            dimension: dim,
            model: kv.get(META_MODEL).cloned().unwrap_or_default(),
            normalized: kv.get(META_NORMALIZED).map(|v| v == "true").unwrap_or(false),
            created_at: kv
                .get(META_CREATED_AT)
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|t| t.with_timezone(&Utc)),
        };

        let collection = Collection::from_records(records, metadata)
            .map_err(|e| Error::corrupt(&self.path, e.to_string()))?;

        debug!(
            "Loaded {} records (dimension {}, model '{}') from {}",
            collection.len(),
            collection.dimension(),
            collection.metadata().model,
            self.path.display()
        );
        Ok(collection)
    }

    /// Collection stats plus on-disk size.
    pub fn stats(&self) -> Result<StoreStats> {
        let collection = self.load()?;
        let mut stats = collection.stats();
        stats.file_size_bytes = fs::metadata(&self.path)?.len();
        Ok(stats)
    }

    fn decode_batch(
        &self,
        batch: &RecordBatch,
        dim: &mut Option<usize>,
        out: &mut Vec<EmbeddingRecord>,
    ) -> Result<()> {
        let ids = self.ids(batch)?;
        let headings: &StringArray = self.required(batch, "heading")?;
        let texts: &StringArray = self.required(batch, "text")?;
        let sections: Option<&StringArray> = self.optional(batch, "section")?;
        let depths: Option<&UInt8Array> = self.optional(batch, "depth")?;
        let parents: Option<&ListArray> = self.optional(batch, "parents")?;
        let vectors = self.vectors(batch, dim)?;

        for row in 0..batch.num_rows() {
            let text = texts.value(row);
            if text.trim().is_empty() {
                return Err(Error::corrupt(&self.path, format!("row {row} has empty text")));
            }

            let section = sections
                .filter(|s| s.is_valid(row))
                .map(|s| s.value(row).to_string());
            let parents = match parents {
                Some(list) if list.is_valid(row) => {
                    let values = list.value(row);
                    let values = values
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| Error::corrupt(&self.path, "column 'parents' is not a list of strings"))?;
                    values.iter().flatten().map(str::to_string).collect()
                }
                _ => Vec::new(),
            };

            let chunk = Chunk {
                id: ids[row],
                heading: headings.value(row).to_string(),
                section,
                depth: depths.map(|d| d.value(row)).unwrap_or(0),
                parents,
                text: text.to_string(),
            };
            out.push(EmbeddingRecord::new(chunk, vectors[row].clone()));
        }

        Ok(())
    }

    fn ids(&self, batch: &RecordBatch) -> Result<Vec<u64>> {
        let column = self.column(batch, "id")?;
        if let Some(ids) = column.as_any().downcast_ref::<UInt64Array>() {
            return Ok(ids.values().to_vec());
        }
        if let Some(ids) = column.as_any().downcast_ref::<Int64Array>() {
            return ids
                .values()
                .iter()
                .map(|&id| {
                    u64::try_from(id)
                        .map_err(|_| Error::corrupt(&self.path, format!("negative id {id}")))
                })
                .collect();
        }
        Err(Error::corrupt(
            &self.path,
            format!("column 'id' has type {}", column.data_type()),
        ))
    }

    /// Decode the vector column, checking every row against the file-wide width.
    fn vectors(&self, batch: &RecordBatch, dim: &mut Option<usize>) -> Result<Vec<Vec<f32>>> {
        let column = self.column(batch, "vector")?;
        let mut rows = Vec::with_capacity(batch.num_rows());

        let row_values = |row: ArrayRef, index: usize| -> Result<Vec<f32>> {
            let values = row
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::corrupt(&self.path, "column 'vector' is not float32"))?;
            if values.null_count() > 0 {
                return Err(Error::corrupt(&self.path, format!("row {index} has null vector values")));
            }
            Ok(values.values().to_vec())
        };

        match column.data_type() {
            DataType::FixedSizeList(_, _) => {
                let list = column
                    .as_any()
                    .downcast_ref::<FixedSizeListArray>()
                    .ok_or_else(|| Error::corrupt(&self.path, "column 'vector' is unreadable"))?;
                let width = list.value_length() as usize;
                self.check_width(dim, width, 0)?;
                for row in 0..list.len() {
                    rows.push(row_values(list.value(row), row)?);
                }
            }
            DataType::List(_) => {
                let list = column
                    .as_any()
                    .downcast_ref::<ListArray>()
                    .ok_or_else(|| Error::corrupt(&self.path, "column 'vector' is unreadable"))?;
                for row in 0..list.len() {
                    self.check_width(dim, list.value_length(row) as usize, row)?;
                    rows.push(row_values(list.value(row), row)?);
                }
            }
            other => {
                return Err(Error::corrupt(
                    &self.path,
                    format!("column 'vector' has type {other}"),
                ))
            }
        }

        Ok(rows)
    }

    fn check_width(&self, dim: &mut Option<usize>, width: usize, row: usize) -> Result<()> {
        match *dim {
            Some(expected) if expected != width => Err(Error::corrupt(
                &self.path,
                format!("row {row} vector width {width}, store dimension {expected}"),
            )),
            Some(_) => Ok(()),
            None => {
                *dim = Some(width);
                Ok(())
            }
        }
    }

    fn column<'a>(&self, batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
        let column = batch
            .column_by_name(name)
            .ok_or_else(|| Error::corrupt(&self.path, format!("missing column '{name}'")))?;
        if column.null_count() > 0 {
            return Err(Error::corrupt(&self.path, format!("column '{name}' has nulls")));
        }
        Ok(column)
    }

    fn required<'a, T: Array + 'static>(&self, batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        let column = self.column(batch, name)?;
        column.as_any().downcast_ref::<T>().ok_or_else(|| {
            Error::corrupt(
                &self.path,
                format!("column '{name}' has type {}", column.data_type()),
            )
        })
    }

    fn optional<'a, T: Array + 'static>(
        &self,
        batch: &'a RecordBatch,
        name: &str,
    ) -> Result<Option<&'a T>> {
        match batch.column_by_name(name) {
            None => Ok(None),
            Some(column) => column.as_any().downcast_ref::<T>().map(Some).ok_or_else(|| {
                Error::corrupt(
                    &self.path,
                    format!("column '{name}' has type {}", column.data_type()),
                )
            }),
        }
    }
}

fn to_batch(records: &[EmbeddingRecord], metadata: &StoreMetadata) -> Result<RecordBatch> {
    let schema = Arc::new(records_schema(metadata)?);

    let ids = UInt64Array::from(records.iter().map(|r| r.chunk.id).collect::<Vec<_>>());
    let headings = StringArray::from(
        records
            .iter()
            .map(|r| r.chunk.heading.as_str())
            .collect::<Vec<_>>(),
    );
    let sections = StringArray::from(
        records
            .iter()
            .map(|r| r.chunk.section.as_deref())
            .collect::<Vec<_>>(),
    );
    let depths = UInt8Array::from(records.iter().map(|r| r.chunk.depth).collect::<Vec<_>>());

    let mut parents = ListBuilder::new(StringBuilder::new());
    for record in records {
        for parent in &record.chunk.parents {
            parents.values().append_value(parent);
        }
        parents.append(true);
    }

    let texts = StringArray::from(
        records
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>(),
    );

    let flat: Vec<f32> = records.iter().flat_map(|r| r.vector.iter().copied()).collect();
    let vectors = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        list_width(metadata.dimension)?,
        Arc::new(Float32Array::from(flat)),
        None,
    )
    .map_err(|e| Error::Store(format!("vector column: {e}")))?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(headings),
        Arc::new(sections),
        Arc::new(depths),
        Arc::new(parents.finish()),
        Arc::new(texts),
        Arc::new(vectors),
    ];

    RecordBatch::try_new(schema, columns).map_err(|e| Error::Store(format!("record batch: {e}")))
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let handle = file.try_clone()?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| Error::Store(e.to_string()))?;
    writer.write(batch).map_err(|e| Error::Store(e.to_string()))?;
    writer.close().map_err(|e| Error::Store(e.to_string()))?;
    handle.sync_all()?;
    Ok(())
}
