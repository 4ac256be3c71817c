//! Page-level aggregation and neighbor-window expansion.
//!
//! Fused chunk scores are rolled up to page scores (plain sum of selected
//! chunk scores, deliberately unnormalized: a page with many weak chunks
//! can outscore a page with one strong chunk, and downstream ranking
//! depends on that), then adjacent pages are pulled in to recover context
//! that a chunk boundary may have split across a page edge.

use std::collections::HashMap;

use crate::models::{StorageSnapshot, StoredChunk, StoredPage};

/// Score decay applied to pages added purely as neighbors.
pub const NEIGHBOR_DECAY: f64 = 0.75;

/// Select chunks at or above `threshold`, ordered score-descending with
/// chunk id as tie-break.
///
/// If the threshold filters out everything, fall back to the top
/// `max(10, 2 * top_k)` chunks regardless of threshold: a query must never
/// come back empty-handed from a non-empty corpus just because every score
/// was low.
pub fn select_chunks<'a>(
    fused: &HashMap<String, f64>,
    snapshot: &'a StorageSnapshot,
    threshold: f64,
    top_k: usize,
) -> Vec<(&'a StoredChunk, f64)> {
    let mut scored: Vec<(&str, f64)> = fused.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    crate::retrieval::sort_scored_desc(&mut scored);

    let mut selected: Vec<(&StoredChunk, f64)> = scored
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .filter_map(|(id, score)| snapshot.chunks.get(*id).map(|c| (c, *score)))
        .collect();

    if selected.is_empty() {
        selected = scored
            .iter()
            .take(10usize.max(top_k * 2))
            .filter_map(|(id, score)| snapshot.chunks.get(*id).map(|c| (c, *score)))
            .collect();
    }

    selected
}

/// Sum selected chunk scores per page and keep the chunk breakdown for
/// later citation assembly.
pub fn page_scores<'a>(
    selected: &[(&'a StoredChunk, f64)],
) -> (HashMap<String, f64>, HashMap<String, Vec<(&'a StoredChunk, f64)>>) {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut page_chunks: HashMap<String, Vec<(&StoredChunk, f64)>> = HashMap::new();
    for (chunk, score) in selected {
        *scores.entry(chunk.page_id.clone()).or_insert(0.0) += score;
        page_chunks
            .entry(chunk.page_id.clone())
            .or_default()
            .push((chunk, *score));
    }
    (scores, page_chunks)
}

/// Top `pool_size` pages by aggregate score, descending, id tie-break.
pub fn top_candidate_pages(scores: &HashMap<String, f64>, pool_size: usize) -> Vec<(String, f64)> {
    let mut candidates: Vec<(&str, f64)> = scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    crate::retrieval::sort_scored_desc(&mut candidates);
    candidates
        .into_iter()
        .take(pool_size)
        .map(|(id, score)| (id.to_string(), score))
        .collect()
}

/// Pull in pages adjacent to each candidate within `neighbor_window`
/// positions, in the same document, at a decayed score. Pages already in
/// the candidate set keep their own score. The merged set is re-sorted
/// descending before being passed on.
pub fn expand_neighbors(
    candidates: &[(String, f64)],
    pages: &HashMap<String, StoredPage>,
    neighbor_window: usize,
) -> Vec<(String, f64)> {
    let mut merged: HashMap<String, f64> = candidates.iter().cloned().collect();

    let page_index: HashMap<(&str, usize), &str> = pages
        .values()
        .map(|p| ((p.doc_id.as_str(), p.page_no), p.page_id.as_str()))
        .collect();

    for (page_id, score) in candidates {
        let Some(page) = pages.get(page_id) else {
            continue;
        };
        for distance in 1..=neighbor_window {
            for neighbor_no in [
                page.page_no.checked_sub(distance),
                page.page_no.checked_add(distance),
            ]
            .into_iter()
            .flatten()
            {
                if let Some(neighbor_id) = page_index.get(&(page.doc_id.as_str(), neighbor_no)) {
                    merged
                        .entry(neighbor_id.to_string())
                        .or_insert(score * NEIGHBOR_DECAY);
                }
            }
        }
    }

    let mut expanded: Vec<(&str, f64)> = merged.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    crate::retrieval::sort_scored_desc(&mut expanded);
    expanded
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(doc_id: &str, page_no: usize) -> StoredPage {
        StoredPage {
            page_id: StoredPage::page_id_for(doc_id, page_no),
            doc_id: doc_id.to_string(),
            page_no,
            page_text: format!("page {page_no}"),
            page_summary: String::new(),
            keywords: vec![],
        }
    }

    fn chunk(doc_id: &str, page_no: usize, chunk_no: usize) -> StoredChunk {
        let page_id = StoredPage::page_id_for(doc_id, page_no);
        StoredChunk {
            chunk_id: StoredChunk::chunk_id_for(&page_id, chunk_no),
            page_id,
            doc_id: doc_id.to_string(),
            page_no,
            chunk_no,
            offset_start: 0,
            offset_end: 0,
            chunk_text: String::new(),
            token_count: 0,
            dense_vector: vec![],
            sparse_terms: HashMap::new(),
        }
    }

    fn snapshot_with_chunks(chunks: Vec<StoredChunk>) -> StorageSnapshot {
        let mut snapshot = StorageSnapshot::default();
        for c in chunks {
            snapshot.chunks.insert(c.chunk_id.clone(), c);
        }
        snapshot
    }

    #[test]
    fn test_threshold_selection() {
        let snapshot = snapshot_with_chunks(vec![chunk("d1", 1, 1), chunk("d1", 1, 2)]);
        let fused = HashMap::from([
            ("d1:p1:c1".to_string(), 0.5),
            ("d1:p1:c2".to_string(), 0.1),
        ]);
        let selected = select_chunks(&fused, &snapshot, 0.3, 5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.chunk_id, "d1:p1:c1");
    }

    #[test]
    fn test_threshold_miss_falls_back_to_top_scored() {
        let snapshot = snapshot_with_chunks(vec![chunk("d1", 1, 1), chunk("d1", 1, 2)]);
        let fused = HashMap::from([
            ("d1:p1:c1".to_string(), 0.02),
            ("d1:p1:c2".to_string(), 0.01),
        ]);
        let selected = select_chunks(&fused, &snapshot, 0.5, 3);
        assert_eq!(selected.len(), 2, "fallback must not return zero chunks");
        assert_eq!(selected[0].0.chunk_id, "d1:p1:c1");
    }

    #[test]
    fn test_page_score_is_sum_of_chunk_scores() {
        let c1 = chunk("d1", 1, 1);
        let c2 = chunk("d1", 1, 2);
        let c3 = chunk("d1", 2, 1);
        let selected = vec![(&c1, 0.4), (&c2, 0.3), (&c3, 0.5)];
        let (scores, page_chunks) = page_scores(&selected);
        assert!((scores["d1:p1"] - 0.7).abs() < 1e-12);
        assert!((scores["d1:p2"] - 0.5).abs() < 1e-12);
        assert_eq!(page_chunks["d1:p1"].len(), 2);
        // Many weak chunks outscore one strong chunk; no normalization.
        assert!(scores["d1:p1"] > scores["d1:p2"]);
    }

    #[test]
    fn test_candidate_pool_cap() {
        let scores = HashMap::from([
            ("p1".to_string(), 3.0),
            ("p2".to_string(), 2.0),
            ("p3".to_string(), 1.0),
        ]);
        let candidates = top_candidate_pages(&scores, 2);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].0, "p1");
        assert_eq!(candidates[1].0, "p2");
    }

    #[test]
    fn test_neighbor_expansion_decay_and_bounds() {
        let pages: HashMap<String, StoredPage> = (1..=3)
            .map(|n| {
                let p = page("d1", n);
                (p.page_id.clone(), p)
            })
            .collect();
        let candidates = vec![("d1:p2".to_string(), 1.0)];
        let expanded = expand_neighbors(&candidates, &pages, 1);

        let as_map: HashMap<_, _> = expanded.iter().cloned().collect();
        assert_eq!(as_map.len(), 3);
        assert!((as_map["d1:p2"] - 1.0).abs() < 1e-12);
        assert!((as_map["d1:p1"] - NEIGHBOR_DECAY).abs() < 1e-12);
        assert!((as_map["d1:p3"] - NEIGHBOR_DECAY).abs() < 1e-12);
        // Re-sorted descending: the original candidate leads.
        assert_eq!(expanded[0].0, "d1:p2");
    }

    #[test]
    fn test_neighbor_expansion_keeps_existing_candidate_score() {
        let pages: HashMap<String, StoredPage> = (1..=2)
            .map(|n| {
                let p = page("d1", n);
                (p.page_id.clone(), p)
            })
            .collect();
        let candidates = vec![("d1:p1".to_string(), 1.0), ("d1:p2".to_string(), 0.9)];
        let expanded = expand_neighbors(&candidates, &pages, 1);
        let as_map: HashMap<_, _> = expanded.iter().cloned().collect();
        // p2 is already a candidate; it must not be decayed.
        assert!((as_map["d1:p2"] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_neighbor_expansion_stays_within_document() {
        let mut pages = HashMap::new();
        for p in [page("d1", 1), page("d2", 2)] {
            pages.insert(p.page_id.clone(), p);
        }
        let candidates = vec![("d1:p1".to_string(), 1.0)];
        let expanded = expand_neighbors(&candidates, &pages, 1);
        assert_eq!(expanded.len(), 1, "d2:p2 belongs to another document");
    }

    #[test]
    fn test_page_one_has_no_page_zero_neighbor() {
        let pages: HashMap<String, StoredPage> = [page("d1", 1), page("d1", 2)]
            .into_iter()
            .map(|p| (p.page_id.clone(), p))
            .collect();
        let candidates = vec![("d1:p1".to_string(), 1.0)];
        let expanded = expand_neighbors(&candidates, &pages, 1);
        assert_eq!(expanded.len(), 2);
    }
}
