// Embedding index
// Persists chunk vectors and texts in LanceDB and answers nearest-neighbour queries


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assembler::DocumentChunk;
use crate::embeddings::Embedder;
use crate::sources::SourceKind;

const TABLE_NAME: &str = "chunks";
const MANIFEST_FILE: &str = "manifest.json";

/// Below this many rows the table is searched exhaustively; ANN training needs more data
pub const ANN_MIN_ROWS: usize = 512;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("No index found at {0}")]
    NotFound(PathBuf),
    #[error("Index at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Index storage error: {0}")]
    Storage(String),
}

/// Build metadata written next to the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

/// A stored chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Insertion order at build time
    pub position: usize,
    pub keyword: String,
    pub source: SourceKind,
    pub text: String,
    /// Cosine similarity to the query vector
    pub similarity: f32,
    /// Unit-length stored vector
    pub vector: Vec<f32>,
}

/// Handle on a built or loaded similarity index.
///
/// The index is rebuilt wholesale by [`EmbeddingIndex::build`]; there is no
/// incremental update.
pub struct EmbeddingIndex {
    dir: PathBuf,
    connection: Connection,
    table: Table,
    embedder: Arc<dyn Embedder>,
    manifest: IndexManifest,
}

impl std::fmt::Debug for EmbeddingIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("dir", &self.dir)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl EmbeddingIndex {
    /// Embed every chunk and replace whatever index is stored in `dir`
    #[inline]
    pub async fn build(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        chunks: &[DocumentChunk],
    ) -> Result<Self, IndexError> {
        info!("Building index over {} chunks in {}", chunks.len(), dir.display());

        fs::create_dir_all(dir).map_err(|e| {
            IndexError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_texts(Arc::clone(&embedder), texts).await?;

        // A failed build must not leave a manifest describing the previous table
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path).map_err(|e| {
                IndexError::Storage(format!("Failed to remove old manifest: {}", e))
            })?;
        }

        let connection = connect(dir).await?;
        drop_table_if_exists(&connection).await?;

        let dimension = embedder.dimension();
        let table = connection
            .create_empty_table(TABLE_NAME, chunk_schema(dimension)?)
            .execute()
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to create table: {}", e)))?;

        if !chunks.is_empty() {
            let batch = record_batch(dimension, chunks, &vectors)?;
            let schema = batch.schema();
            let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| IndexError::Storage(format!("Failed to insert chunks: {}", e)))?;
        }

        if chunks.len() >= ANN_MIN_ROWS {
            match table
                .create_index(&["vector"], lancedb::index::Index::Auto)
                .execute()
                .await
            {
                Ok(()) => debug!("Created ANN index over {} rows", chunks.len()),
                Err(e) => warn!("Failed to create ANN index, falling back to flat search: {}", e),
            }
        }

        let manifest = IndexManifest {
            model: embedder.model_name().to_string(),
            dimension,
            chunk_count: chunks.len(),
            built_at: Utc::now(),
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| IndexError::Storage(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(&manifest_path, manifest_json)
            .map_err(|e| IndexError::Storage(format!("Failed to write manifest: {}", e)))?;

        info!(
            "Index built: {} chunks, {} dimensions, model {}",
            manifest.chunk_count, manifest.dimension, manifest.model
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            connection,
            table,
            embedder,
            manifest,
        })
    }

    /// Open the index persisted in `dir` by a previous build
    #[inline]
    pub async fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }

        let corrupt = |reason: String| IndexError::Corrupt {
            path: dir.to_path_buf(),
            reason,
        };

        let manifest: IndexManifest = fs::read_to_string(&manifest_path)
            .map_err(|e| corrupt(format!("unreadable manifest: {}", e)))
            .and_then(|content| {
                serde_json::from_str(&content)
                    .map_err(|e| corrupt(format!("invalid manifest: {}", e)))
            })?;

        if manifest.dimension != embedder.dimension() || manifest.model != embedder.model_name() {
            return Err(corrupt(format!(
                "built with {} ({} dimensions), current embedder is {} ({} dimensions)",
                manifest.model,
                manifest.dimension,
                embedder.model_name(),
                embedder.dimension()
            )));
        }

        let connection = connect(dir).await?;
        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| corrupt(format!("cannot open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| corrupt(format!("cannot read schema: {}", e)))?;
        let stored_dimension = schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| corrupt("missing vector column".to_string()))?;
        if stored_dimension != manifest.dimension {
            return Err(corrupt(format!(
                "table has {} dimensions, manifest says {}",
                stored_dimension, manifest.dimension
            )));
        }

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| corrupt(format!("cannot count rows: {}", e)))?;
        if rows != manifest.chunk_count {
            return Err(corrupt(format!(
                "table has {} rows, manifest says {}",
                rows, manifest.chunk_count
            )));
        }

        debug!(
            "Loaded index with {} chunks from {}",
            manifest.chunk_count,
            dir.display()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            connection,
            table,
            embedder,
            manifest,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.manifest.chunk_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.manifest.chunk_count == 0
    }

    #[inline]
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unit-length embedding of a query string
    #[inline]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, IndexError> {
        let mut vectors = embed_texts(Arc::clone(&self.embedder), vec![query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::Embedding("No vector returned for query".to_string()))
    }

    /// Up to `limit` stored chunks closest to `query_vector`
    #[inline]
    pub async fn nearest(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        if self.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.manifest.dimension {
            return Err(IndexError::Embedding(format!(
                "Query has {} dimensions, index has {}",
                query_vector.len(),
                self.manifest.dimension
            )));
        }

        let mut results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| IndexError::Storage(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(self.parse_hits(&batch, query_vector)?);
        }

        debug!("Nearest-neighbour search returned {} hits", hits.len());
        Ok(hits)
    }

    fn parse_hits(&self, batch: &RecordBatch, query: &[f32]) -> Result<Vec<IndexHit>, IndexError> {
        let corrupt = |reason: String| IndexError::Corrupt {
            path: self.dir.clone(),
            reason,
        };

        let positions = column::<UInt32Array>(batch, "position").map_err(&corrupt)?;
        let keywords = column::<StringArray>(batch, "keyword").map_err(&corrupt)?;
        let sources = column::<StringArray>(batch, "source").map_err(&corrupt)?;
        let texts = column::<StringArray>(batch, "text").map_err(&corrupt)?;
        let vectors = column::<FixedSizeListArray>(batch, "vector").map_err(&corrupt)?;

        (0..batch.num_rows())
            .map(|row| {
                let vector_values = vectors.value(row);
                let vector = vector_values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| corrupt("invalid vector values".to_string()))?
                    .values()
                    .to_vec();
                let source = sources
                    .value(row)
                    .parse::<SourceKind>()
                    .map_err(|e| corrupt(e.to_string()))?;

                Ok(IndexHit {
                    position: positions.value(row) as usize,
                    keyword: keywords.value(row).to_string(),
                    source,
                    text: texts.value(row).to_string(),
                    similarity: dot(query, &vector),
                    vector,
                })
            })
            .collect()
    }

    /// Release the handle
    #[inline]
    pub fn close(self) {
        debug!("Closing index at {}", self.dir.display());
        drop(self.table);
        drop(self.connection);
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, String> {
    batch
        .column_by_name(name)
        .ok_or_else(|| format!("missing {} column", name))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("invalid {} column type", name))
}

async fn connect(dir: &Path) -> Result<Connection, IndexError> {
    let uri = format!("file://{}", dir.display());
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| IndexError::Storage(format!("Failed to connect to LanceDB: {}", e)))
}

async fn drop_table_if_exists(connection: &Connection) -> Result<(), IndexError> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| IndexError::Storage(format!("Failed to list tables: {}", e)))?;

    if table_names.iter().any(|name| name == TABLE_NAME) {
        debug!("Dropping previous chunks table");
        connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to drop table: {}", e)))?;
    }
    Ok(())
}

/// Run the embedder on a blocking worker and normalise the results
async fn embed_texts(
    embedder: Arc<dyn Embedder>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, IndexError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let expected = texts.len();
    let dimension = embedder.dimension();
    let mut vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| IndexError::Embedding(format!("Embedding worker failed: {}", e)))?
        .map_err(|e| IndexError::Embedding(format!("{:#}", e)))?;

    if vectors.len() != expected {
        return Err(IndexError::Embedding(format!(
            "Expected {} vectors, got {}",
            expected,
            vectors.len()
        )));
    }

    for vector in &mut vectors {
        if vector.len() != dimension {
            return Err(IndexError::Embedding(format!(
                "Expected {} dimensions, got {}",
                dimension,
                vector.len()
            )));
        }
        normalize(vector);
    }

    Ok(vectors)
}

fn list_size(dimension: usize) -> Result<i32, IndexError> {
    i32::try_from(dimension).map_err(|_| {
        IndexError::Storage(format!("Vector dimension {} is too large", dimension))
    })
}

fn chunk_schema(dimension: usize) -> Result<Arc<Schema>, IndexError> {
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                list_size(dimension)?,
            ),
            false,
        ),
        Field::new("position", DataType::UInt32, false),
        Field::new("keyword", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
    ])))
}

fn record_batch(
    dimension: usize,
    chunks: &[DocumentChunk],
    vectors: &[Vec<f32>],
) -> Result<RecordBatch, IndexError> {
    let ids: Vec<String> = chunks
        .iter()
        .map(|_| uuid::Uuid::new_v4().to_string())
        .collect();
    let positions: Vec<u32> = (0..chunks.len())
        .map(|p| {
            u32::try_from(p).map_err(|_| IndexError::Storage("Too many chunks".to_string()))
        })
        .collect::<Result<_, _>>()?;

    let mut flat_values = Vec::with_capacity(chunks.len() * dimension);
    for vector in vectors {
        flat_values.extend_from_slice(vector);
    }
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        list_size(dimension)?,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| IndexError::Storage(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(UInt32Array::from(positions)),
        Arc::new(StringArray::from_iter_values(
            chunks.iter().map(|c| c.keyword.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            chunks.iter().map(|c| c.source.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            chunks.iter().map(|c| c.text.as_str()),
        )),
    ];

    RecordBatch::try_new(chunk_schema(dimension)?, arrays)
        .map_err(|e| IndexError::Storage(format!("Failed to create record batch: {}", e)))
}

/// Scale to unit length; zero vectors are left unchanged
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
