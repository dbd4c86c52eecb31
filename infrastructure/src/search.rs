use domain::models::Embedding;

pub struct SearchEngine;

impl SearchEngine {
    /// Zero-norm vectors have similarity 0 rather than NaN.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot_product / (norm_a * norm_b)
    }

    pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        1.0 - Self::cosine_similarity(a, b)
    }

    /// Texts of the `top_k` entries closest to the query, nearest first.
    /// Equal distances keep insertion order.
    pub fn find_relevant_chunks(
        query_embedding: &[f32],
        embeddings: &[Embedding],
        top_k: usize,
    ) -> Vec<String> {
        let mut distances: Vec<(f32, &str)> = embeddings
            .iter()
            .map(|emb| {
                (
                    Self::cosine_distance(query_embedding, &emb.vector),
                    &emb.chunk.text[..],
                )
            })
            .collect();

        // sort_by is stable, so ties stay in insertion order
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));
        distances
            .into_iter()
            .take(top_k)
            .map(|(_, text)| text.to_string())
            .collect()
    }
}
