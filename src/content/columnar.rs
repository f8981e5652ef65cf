//! Arrow IPC serialization for the columnar CPP artifacts.
//!
//! `content_stream.arrow` holds (page_id int32, text utf8, byte_start
//! int64, byte_end int64); `provenance_map.arrow` holds (token_id utf8,
//! page_id int32, byte_start int64, byte_end int64, parser_id utf8).
//! Column order is fixed so two runs produce byte-identical files.

use crate::content::stream::{BoundingBox, ContentStream, PageRow, ProvenanceMap, TokenBinding};
use crate::error::{IoError, Result};
use arrow::array::{Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

fn columnar_err(path: &Path, err: impl std::fmt::Display) -> crate::error::Error {
    IoError::Columnar {
        path: path.to_string_lossy().to_string(),
        reason: err.to_string(),
    }
    .into()
}

fn content_stream_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("page_id", DataType::Int32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("byte_start", DataType::Int64, false),
        Field::new("byte_end", DataType::Int64, false),
    ]))
}

fn provenance_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("token_id", DataType::Utf8, false),
        Field::new("page_id", DataType::Int32, false),
        Field::new("byte_start", DataType::Int64, false),
        Field::new("byte_end", DataType::Int64, false),
        Field::new("parser_id", DataType::Utf8, false),
    ]))
}

/// Writes the content stream as a single-batch Arrow IPC file.
///
/// # Errors
///
/// Returns an error if batch construction or the file write fails.
pub fn write_content_stream<P: AsRef<Path>>(path: P, stream: &ContentStream) -> Result<()> {
    let path = path.as_ref();
    let schema = content_stream_schema();

    let page_ids: Int32Array = stream.rows.iter().map(|r| Some(r.page_id)).collect();
    let texts: StringArray = stream.rows.iter().map(|r| Some(r.text.as_str())).collect();
    let starts: Int64Array = stream.rows.iter().map(|r| Some(r.byte_start)).collect();
    let ends: Int64Array = stream.rows.iter().map(|r| Some(r.byte_end)).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(page_ids),
            Arc::new(texts),
            Arc::new(starts),
            Arc::new(ends),
        ],
    )
    .map_err(|e| columnar_err(path, e))?;

    write_single_batch(path, &schema, &batch)
}

/// Reads a content stream from an Arrow IPC file.
///
/// # Errors
///
/// Returns an error if the file is unreadable or has the wrong schema.
pub fn read_content_stream<P: AsRef<Path>>(path: P) -> Result<ContentStream> {
    let path = path.as_ref();
    let mut rows = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch.map_err(|e| columnar_err(path, e))?;
        let page_ids = downcast::<Int32Array>(&batch, 0, path)?;
        let texts = downcast::<StringArray>(&batch, 1, path)?;
        let starts = downcast::<Int64Array>(&batch, 2, path)?;
        let ends = downcast::<Int64Array>(&batch, 3, path)?;
        for i in 0..batch.num_rows() {
            rows.push(PageRow {
                page_id: page_ids.value(i),
                text: texts.value(i).to_string(),
                byte_start: starts.value(i),
                byte_end: ends.value(i),
            });
        }
    }
    Ok(ContentStream { rows })
}

/// Writes the provenance map as a single-batch Arrow IPC file.
///
/// The on-disk layout carries the five columnar fields; bounding boxes
/// live only in the chunk graph's provenance records.
///
/// # Errors
///
/// Returns an error if batch construction or the file write fails.
pub fn write_provenance_map<P: AsRef<Path>>(path: P, map: &ProvenanceMap) -> Result<()> {
    let path = path.as_ref();
    let schema = provenance_schema();

    let token_ids: StringArray = map.tokens.iter().map(|t| Some(t.token_id.as_str())).collect();
    let page_ids: Int32Array = map.tokens.iter().map(|t| Some(t.page_id)).collect();
    let starts: Int64Array = map.tokens.iter().map(|t| Some(t.byte_start)).collect();
    let ends: Int64Array = map.tokens.iter().map(|t| Some(t.byte_end)).collect();
    let parser_ids: StringArray = map.tokens.iter().map(|t| Some(t.parser_id.as_str())).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(token_ids),
            Arc::new(page_ids),
            Arc::new(starts),
            Arc::new(ends),
            Arc::new(parser_ids),
        ],
    )
    .map_err(|e| columnar_err(path, e))?;

    write_single_batch(path, &schema, &batch)
}

/// Reads a provenance map from an Arrow IPC file.
///
/// Bounding boxes and confidences are not part of the columnar layout and
/// come back zeroed; consumers needing them read the chunk graph instead.
///
/// # Errors
///
/// Returns an error if the file is unreadable or has the wrong schema.
pub fn read_provenance_map<P: AsRef<Path>>(path: P) -> Result<ProvenanceMap> {
    let path = path.as_ref();
    let mut tokens = Vec::new();
    for batch in open_reader(path)? {
        let batch = batch.map_err(|e| columnar_err(path, e))?;
        let token_ids = downcast::<StringArray>(&batch, 0, path)?;
        let page_ids = downcast::<Int32Array>(&batch, 1, path)?;
        let starts = downcast::<Int64Array>(&batch, 2, path)?;
        let ends = downcast::<Int64Array>(&batch, 3, path)?;
        let parser_ids = downcast::<StringArray>(&batch, 4, path)?;
        for i in 0..batch.num_rows() {
            tokens.push(TokenBinding {
                token_id: token_ids.value(i).to_string(),
                page_id: page_ids.value(i),
                bbox: BoundingBox::EMPTY,
                byte_start: starts.value(i),
                byte_end: ends.value(i),
                parser_id: parser_ids.value(i).to_string(),
                confidence: 1.0,
            });
        }
    }
    Ok(ProvenanceMap { tokens })
}

fn write_single_batch(path: &Path, schema: &Arc<Schema>, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).map_err(|e| columnar_err(path, e))?;
    let mut writer = FileWriter::try_new(file, schema).map_err(|e| columnar_err(path, e))?;
    writer.write(batch).map_err(|e| columnar_err(path, e))?;
    writer.finish().map_err(|e| columnar_err(path, e))?;
    Ok(())
}

fn open_reader(path: &Path) -> Result<FileReader<File>> {
    let file = File::open(path).map_err(|e| columnar_err(path, e))?;
    FileReader::try_new(file, None).map_err(|e| columnar_err(path, e))
}

fn downcast<'a, T: 'static>(
    batch: &'a RecordBatch,
    column: usize,
    path: &Path,
) -> Result<&'a T> {
    batch
        .column(column)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| columnar_err(path, format!("column {column} has unexpected type")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream() -> ContentStream {
        ContentStream {
            rows: vec![
                PageRow {
                    page_id: 0,
                    text: "presupuesto municipal".to_string(),
                    byte_start: 0,
                    byte_end: 21,
                },
                PageRow {
                    page_id: 1,
                    text: " COP 1.200.000.000".to_string(),
                    byte_start: 21,
                    byte_end: 39,
                },
            ],
        }
    }

    #[test]
    fn test_content_stream_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content_stream.arrow");
        let stream = sample_stream();
        write_content_stream(&path, &stream).unwrap();
        let back = read_content_stream(&path).unwrap();
        assert_eq!(back, stream);
    }

    #[test]
    fn test_content_stream_write_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.arrow");
        let b = dir.path().join("b.arrow");
        let stream = sample_stream();
        write_content_stream(&a, &stream).unwrap();
        write_content_stream(&b, &stream).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_provenance_roundtrip_columnar_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provenance_map.arrow");
        let map = ProvenanceMap {
            tokens: vec![TokenBinding {
                token_id: "p0-t0".to_string(),
                page_id: 0,
                bbox: BoundingBox::EMPTY,
                byte_start: 0,
                byte_end: 11,
                parser_id: "plain-text".to_string(),
                confidence: 1.0,
            }],
        };
        write_provenance_map(&path, &map).unwrap();
        let back = read_provenance_map(&path).unwrap();
        assert_eq!(back.tokens.len(), 1);
        assert_eq!(back.tokens[0].token_id, "p0-t0");
        assert_eq!(back.tokens[0].parser_id, "plain-text");
        assert_eq!(back.tokens[0].byte_end, 11);
    }

    #[test]
    fn test_empty_stream_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.arrow");
        write_content_stream(&path, &ContentStream::default()).unwrap();
        let back = read_content_stream(&path).unwrap();
        assert!(back.rows.is_empty());
    }

    #[test]
    fn test_read_missing_file_fails() {
        let result = read_content_stream("/nonexistent/content_stream.arrow");
        assert!(result.is_err());
    }
}
