// Embeddings module
// Defines the embedding seam and the Hugging Face Inference API client

pub mod hf;

use crate::Result;

/// Converts text into fixed-dimension vectors.
///
/// One embedder instance backs one index, which is what keeps every vector in
/// that index at the same dimensionality. Inputs are expected to be non-empty;
/// the document loader filters blank content before it gets here.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub use hf::HfInferenceClient;
