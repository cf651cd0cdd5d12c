
use super::DocumentRecord;
use crate::config::{Config, StorageMode};
use crate::database::{Document, DocumentStore, RetrievedDocument, StoredDocument};
use crate::{RagError, Result};
use ::lancedb::query::{ExecutableQuery, QueryBase};
use ::lancedb::{Connection, DistanceType};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
    /// Model that embedded the stored rows
    embedding_model: Option<String>,
    /// Backing directory for in-memory mode, removed on drop
    scratch_dir: Option<TempDir>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .field("embedding_model", &self.embedding_model)
            .field("ephemeral", &self.scratch_dir.is_some())
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Open the collection described by the storage section of `config`
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        match config.storage.mode {
            StorageMode::Persistent => {
                Self::open_at(&config.vector_database_path(), &config.storage.collection).await
            }
            StorageMode::Memory => {
                let scratch_dir = TempDir::new().map_err(|e| {
                    RagError::Database(format!("Failed to create scratch directory: {}", e))
                })?;
                let mut store =
                    Self::open_at(scratch_dir.path(), &config.storage.collection).await?;
                store.scratch_dir = Some(scratch_dir);
                Ok(store)
            }
        }
    }

    /// Open (creating the directory if needed) the collection `table_name` under `db_path`
    #[inline]
    pub async fn open_at(db_path: &Path, table_name: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy();
        let connection = ::lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            table_name: table_name.to_string(),
            vector_dimension: None,
            embedding_model: None,
            scratch_dir: None,
        };

        if store.table_exists().await? {
            let dim = store.detect_existing_vector_dimension().await?;
            store.vector_dimension = Some(dim);
            store.embedding_model = store.detect_embedding_model().await?;
            info!(
                "Opened collection {} with vector dimension {} embedded by {}",
                store.table_name,
                dim,
                store.embedding_model.as_deref().unwrap_or("nothing yet")
            );
        } else {
            debug!(
                "Collection {} does not exist yet, it will be created on first insert",
                store.table_name
            );
        }

        Ok(store)
    }

    /// Dimension of the stored vectors, if the collection exists
    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<::lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    /// Read the embedding model from one stored row
    async fn detect_embedding_model(&self) -> Result<Option<String>> {
        let table = self.open_table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .limit(1)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read collection: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?;

        for batch in &batches {
            if let Some(stored) = parse_document_batch(batch)?.into_iter().next() {
                return Ok(Some(stored.embedding_model));
            }
        }

        Ok(None)
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        RagError::Database(format!("Invalid vector dimension: {}", size))
                    });
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("document", DataType::Utf8, false),
            Field::new("embedding_model", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn dimension_as_i32(vector_dim: usize) -> Result<i32> {
        i32::try_from(vector_dim)
            .map_err(|_| RagError::Database(format!("Vector dimension too large: {}", vector_dim)))
    }

    async fn create_table(&mut self, vector_dim: usize) -> Result<()> {
        info!(
            "Creating collection {} with vector dimension {}",
            self.table_name, vector_dim
        );

        let schema = Self::create_schema(Self::dimension_as_i32(vector_dim)?);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        self.vector_dimension = Some(vector_dim);
        Ok(())
    }

    /// Create a RecordBatch from document records
    fn create_record_batch(records: &[DocumentRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut documents = Vec::with_capacity(len);
        let mut models = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);

        for record in records {
            ids.push(record.id.as_str());
            documents.push(record.document.as_str());
            models.push(record.embedding_model.as_str());
            created_ats.push(record.created_at.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let dim = Self::dimension_as_i32(vector_dim)?;
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, dim, Arc::new(Float32Array::from(flat_values)), None)
                .map_err(|e| {
                    RagError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(documents)),
            Arc::new(StringArray::from(models)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Read every row of the collection
    async fn scan_all(&self) -> Result<Vec<RecordBatch>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        if total == 0 {
            return Ok(Vec::new());
        }

        table
            .query()
            .limit(total)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to scan table: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))
    }

    /// Drop the collection table if it exists
    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping collection {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

/// Parse a search result batch into retrieved documents
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RetrievedDocument>> {
    let ids = string_column(batch, "id")?;
    let documents = string_column(batch, "document")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let results = (0..batch.num_rows())
        .map(|row| RetrievedDocument {
            id: ids.value(row).to_string(),
            text: documents.value(row).to_string(),
            distance: distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
        })
        .collect();

    Ok(results)
}

fn parse_document_batch(batch: &RecordBatch) -> Result<Vec<StoredDocument>> {
    let ids = string_column(batch, "id")?;
    let documents = string_column(batch, "document")?;
    let models = string_column(batch, "embedding_model")?;

    let results = (0..batch.num_rows())
        .map(|row| StoredDocument {
            document: Document::new(ids.value(row), documents.value(row)),
            embedding_model: models.value(row).to_string(),
        })
        .collect();

    Ok(results)
}

/// Orders `doc_2` before `doc_10`
fn id_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[async_trait]
impl DocumentStore for VectorStore {
    #[inline]
    fn collection_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    #[inline]
    async fn add_records(&mut self, records: Vec<DocumentRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            debug!("No documents to store");
            return Ok(());
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(RagError::Database("Cannot store empty vectors".to_string()));
        }

        if let Some(record) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::Database(format!(
                "Vector for {} has dimension {}, expected {}",
                record.id,
                record.vector.len(),
                vector_dim
            )));
        }

        let model = first.embedding_model.clone();
        if let Some(record) = records.iter().find(|r| r.embedding_model != model) {
            return Err(RagError::Database(format!(
                "Document {} was embedded with {}, the rest of the batch with {}",
                record.id, record.embedding_model, model
            )));
        }
        if let Some(stored) = self.embedding_model.as_deref().filter(|stored| *stored != model) {
            return Err(RagError::Database(format!(
                "Collection {} holds embeddings from {}, cannot add embeddings from {}; reset the collection first",
                self.table_name, stored, model
            )));
        }

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(record) = records.iter().find(|r| !seen.insert(r.id.as_str())) {
            return Err(RagError::Database(format!("Duplicate id in batch: {}", record.id)));
        }

        let table_exists = self.table_exists().await?;
        match (self.vector_dimension, table_exists) {
            (Some(existing), true) if existing != vector_dim => {
                return Err(RagError::Database(format!(
                    "Vector dimension {} does not match collection dimension {}; reset the collection first",
                    vector_dim, existing
                )));
            }
            (_, true) => {
                let existing_ids: HashSet<String> = self
                    .documents()
                    .await?
                    .into_iter()
                    .map(|stored| stored.document.id)
                    .collect();
                if let Some(record) = records.iter().find(|r| existing_ids.contains(&r.id)) {
                    return Err(RagError::Database(format!(
                        "Id already exists in collection {}: {}",
                        self.table_name, record.id
                    )));
                }
            }
            (_, false) => self.create_table(vector_dim).await?,
        }

        debug!("Storing batch of {} documents", records.len());

        let record_batch = Self::create_record_batch(&records, vector_dim)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert documents: {}", e)))?;

        self.embedding_model = Some(model);
        info!(
            "Stored {} documents in collection {}",
            records.len(),
            self.table_name
        );
        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>> {
        debug!("Searching for nearest documents with k: {}", k);

        if k == 0 {
            return Ok(Vec::new());
        }

        let Some(dimension) = self.vector_dimension else {
            debug!("Collection {} is empty", self.table_name);
            return Ok(Vec::new());
        };

        if vector.len() != dimension {
            return Err(RagError::Database(format!(
                "Query vector has dimension {}, collection {} expects {}; was it embedded with a different model?",
                vector.len(),
                self.table_name,
                dimension
            )));
        }

        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let batches: Vec<RecordBatch> = table
            .vector_search(vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(parse_search_batch(batch)?);
        }

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);

        debug!("Retrieved {} documents", results.len());
        Ok(results)
    }

    #[inline]
    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    #[inline]
    async fn documents(&self) -> Result<Vec<StoredDocument>> {
        let mut documents = Vec::new();
        for batch in &self.scan_all().await? {
            documents.extend(parse_document_batch(batch)?);
        }

        documents.sort_by(|a, b| id_order(&a.document.id, &b.document.id));
        Ok(documents)
    }

    #[inline]
    async fn reset(&mut self) -> Result<()> {
        self.drop_table_if_exists().await?;
        self.vector_dimension = None;
        self.embedding_model = None;
        Ok(())
    }
}
