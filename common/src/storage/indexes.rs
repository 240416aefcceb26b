use crate::{error::AppError, storage::db::SurrealDbClient};

/// Build the runtime Surreal indexes. Idempotent: every definition uses
/// IF NOT EXISTS except the HNSW index, which is overwritten so a changed
/// embedding dimension takes effect.
///
/// The pre-filtered retrieval query scores `vector::similarity::cosine`
/// over the filtered set directly; the HNSW index serves unfiltered
/// nearest-neighbour lookups.
pub async fn ensure_runtime_indexes(
    db: &SurrealDbClient,
    embedding_dimension: usize,
) -> Result<(), AppError> {
    let definitions = [
        "DEFINE INDEX IF NOT EXISTS idx_job_status ON TABLE job FIELDS status".to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_job_workspace ON TABLE job FIELDS workspace_id".to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_job_created ON TABLE job FIELDS created_at".to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_document_identity ON TABLE document \
         FIELDS workspace_id, source_type, external_id UNIQUE"
            .to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_vault_name ON TABLE vault \
         FIELDS workspace_id, name UNIQUE"
            .to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_chunk_document ON TABLE document_chunk \
         FIELDS workspace_id, document_id"
            .to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_mention_document ON TABLE entity_mention \
         FIELDS workspace_id, document_id"
            .to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_mention_key ON TABLE entity_mention \
         FIELDS workspace_id, entity_key"
            .to_string(),
        "DEFINE INDEX IF NOT EXISTS idx_graph_chunk_document ON TABLE graph_chunk \
         FIELDS workspace_id, document_id"
            .to_string(),
        format!(
            "DEFINE INDEX OVERWRITE idx_embedding_graph_chunk ON TABLE graph_chunk \
             FIELDS embedding HNSW DIMENSION {embedding_dimension} DIST COSINE TYPE F32 EFC 100 M 8"
        ),
    ];

    for definition in definitions {
        db.client.query(definition).await?.check()?;
    }

    Ok(())
}
