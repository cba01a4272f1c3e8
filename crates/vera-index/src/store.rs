//! Index build, persistence, and load
//!
//! The persisted index is two artifacts written and read together:
//!
//! - `index.vec`: binary matrix, little-endian. 8-byte magic `VERAIDX1`,
//!   `u32` row count, `u32` column count, then row-major `f32` values.
//!   Rows are unit-normalized document embeddings.
//! - `index.meta.tsv`: versioned header line, then one record per document:
//!   `id \t filename \t text`. Tabs and newlines inside a field are
//!   replaced by spaces at write time so the one-record-per-line framing
//!   survives any document content.
//!
//! Both files are written to temporaries and renamed into place, so a
//! failed build never leaves a partial index behind.

use ndarray::Array2;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use vera_core::{Document, PathsConfig, Result, VeraError};

use crate::embedding::EmbeddingClient;
use crate::VectorIndex;

const MATRIX_MAGIC: &[u8; 8] = b"VERAIDX1";
const META_HEADER: &str = "#vera-meta\tv1";

/// Added to every L2 norm before division so zero vectors stay finite
pub const NORM_EPSILON: f32 = 1e-10;

/// Scale a vector to unit L2 norm in place, epsilon-guarded.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt() + NORM_EPSILON;
    for v in vector.iter_mut() {
        *v /= norm;
    }
}

fn flatten(field: &str) -> String {
    field.replace(['\n', '\r', '\t'], " ")
}

/// Builds, persists, and loads the vector index.
pub struct IndexStore {
    paths: PathsConfig,
}

impl IndexStore {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// Build the index from every `.txt` file in the configured corpus
    /// directory and persist it, replacing any existing index. File names
    /// are enumerated lexicographically and that order assigns document
    /// ids; files that are empty after trimming are skipped without
    /// consuming an id. Returns the number of documents indexed.
    pub async fn build(&self, embedder: &dyn EmbeddingClient) -> Result<usize> {
        let docs_dir = &self.paths.docs_dir;

        let mut files: Vec<PathBuf> = match fs::read_dir(docs_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        files.sort();

        if files.is_empty() {
            return Err(VeraError::EmptyCorpus {
                dir: docs_dir.display().to_string(),
            });
        }

        let mut documents = Vec::new();
        for path in &files {
            let text = fs::read_to_string(path)?;
            let text = text.trim();
            if text.is_empty() {
                tracing::debug!(file = %path.display(), "skipping empty document");
                continue;
            }
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            documents.push(Document::new(documents.len(), filename, text));
        }

        if documents.is_empty() {
            return Err(VeraError::EmptyCorpus {
                dir: docs_dir.display().to_string(),
            });
        }

        tracing::info!("building index for {} documents", documents.len());

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let dim = embeddings
            .first()
            .map(|v| v.len())
            .filter(|&d| d > 0)
            .ok_or_else(|| VeraError::EmbeddingError("provider returned no embeddings".to_string()))?;

        let mut flat = Vec::with_capacity(documents.len() * dim);
        for (doc, mut row) in documents.iter().zip(embeddings) {
            if row.len() != dim {
                return Err(VeraError::EmbeddingError(format!(
                    "inconsistent embedding dimension for {}: got {}, expected {dim}",
                    doc.filename,
                    row.len()
                )));
            }
            normalize(&mut row);
            flat.extend_from_slice(&row);
        }

        let matrix = Array2::from_shape_vec((documents.len(), dim), flat)
            .map_err(|e| VeraError::EmbeddingError(format!("matrix shape: {e}")))?;

        self.persist(&matrix, &documents)?;

        tracing::info!(
            matrix = %self.paths.matrix_path().display(),
            meta = %self.paths.meta_path().display(),
            "index built and saved"
        );
        Ok(documents.len())
    }

    fn persist(&self, matrix: &Array2<f32>, documents: &[Document]) -> Result<()> {
        fs::create_dir_all(&self.paths.index_dir)?;

        let matrix_path = self.paths.matrix_path();
        let meta_path = self.paths.meta_path();
        let matrix_tmp = matrix_path.with_extension("vec.tmp");
        let meta_tmp = meta_path.with_extension("tsv.tmp");

        write_matrix(&matrix_tmp, matrix)?;
        write_metadata(&meta_tmp, documents)?;

        // Rename into place only once both temporaries are complete
        fs::rename(&matrix_tmp, &matrix_path)?;
        fs::rename(&meta_tmp, &meta_path)?;
        Ok(())
    }

    /// Load the persisted index, validating that the matrix and metadata
    /// describe the same number of documents in the same order.
    pub fn load(&self) -> Result<VectorIndex> {
        let matrix_path = self.paths.matrix_path();
        let meta_path = self.paths.meta_path();

        if !matrix_path.exists() || !meta_path.exists() {
            return Err(VeraError::IndexNotFound {
                path: self.paths.index_dir.display().to_string(),
            });
        }

        let matrix = read_matrix(&matrix_path)?;
        let documents = read_metadata(&meta_path)?;

        if matrix.nrows() != documents.len() {
            return Err(VeraError::IndexCorrupt(format!(
                "matrix has {} rows but metadata has {} records",
                matrix.nrows(),
                documents.len()
            )));
        }

        tracing::debug!("loaded index with {} documents", documents.len());
        Ok(VectorIndex { matrix, documents })
    }
}

fn write_matrix(path: &Path, matrix: &Array2<f32>) -> Result<()> {
    let mut file = std::io::BufWriter::new(fs::File::create(path)?);
    file.write_all(MATRIX_MAGIC)?;
    file.write_all(&(matrix.nrows() as u32).to_le_bytes())?;
    file.write_all(&(matrix.ncols() as u32).to_le_bytes())?;
    for value in matrix.iter() {
        file.write_all(&value.to_le_bytes())?;
    }
    file.flush()?;
    Ok(())
}

fn read_matrix(path: &Path) -> Result<Array2<f32>> {
    let bytes = fs::read(path)?;
    if bytes.len() < 16 || &bytes[..8] != MATRIX_MAGIC {
        return Err(VeraError::IndexCorrupt(
            "matrix file has an unrecognized header".to_string(),
        ));
    }

    let rows = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let cols = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let payload = &bytes[16..];

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| VeraError::IndexCorrupt("matrix dimensions overflow".to_string()))?;
    if payload.len() != expected {
        return Err(VeraError::IndexCorrupt(format!(
            "matrix payload is {} bytes, expected {expected} for {rows}x{cols}",
            payload.len()
        )));
    }

    let values: Vec<f32> = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| VeraError::IndexCorrupt(format!("matrix shape: {e}")))
}

fn write_metadata(path: &Path, documents: &[Document]) -> Result<()> {
    let mut file = std::io::BufWriter::new(fs::File::create(path)?);
    writeln!(file, "{META_HEADER}")?;
    for doc in documents {
        writeln!(
            file,
            "{}\t{}\t{}",
            doc.id,
            flatten(&doc.filename),
            flatten(&doc.text)
        )?;
    }
    file.flush()?;
    Ok(())
}

fn read_metadata(path: &Path) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines();

    match lines.next() {
        Some(header) if header == META_HEADER => {}
        _ => {
            return Err(VeraError::IndexCorrupt(
                "metadata file has an unsupported header".to_string(),
            ))
        }
    }

    let mut documents = Vec::new();
    for (ordinal, line) in lines.enumerate() {
        let mut fields = line.splitn(3, '\t');
        let (Some(id), Some(filename), Some(text)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(VeraError::IndexCorrupt(format!(
                "metadata record {ordinal} does not have 3 fields"
            )));
        };

        let id: usize = id
            .parse()
            .map_err(|_| VeraError::IndexCorrupt(format!("metadata record {ordinal} has id {id:?}")))?;
        if id != ordinal {
            return Err(VeraError::IndexCorrupt(format!(
                "metadata record {ordinal} carries id {id}"
            )));
        }

        documents.push(Document::new(id, filename, text));
    }

    Ok(documents)
}

// ============================================================================
// Tests
// ============================================================================
