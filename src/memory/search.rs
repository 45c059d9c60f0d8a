use anyhow::Result;
use rusqlite::{params, Connection};
use std::collections::HashSet;

use crate::crypto::FieldCodec;
use crate::memory::store::{RawMemoryRow, MEMORY_COLUMNS};
use crate::memory::types::{Memory, RecallQuery};

/// Candidate multiplier for full-text search in plaintext mode.
const FTS_CANDIDATE_FACTOR: usize = 3;
/// Candidate multiplier for the decrypt-and-scan path in encrypted mode.
const SCAN_CANDIDATE_FACTOR: usize = 8;
/// Upper bound on any SQL `LIMIT` bound from `k`.
const MAX_CANDIDATES: usize = i64::MAX as usize;

/// Retrieve up to `query.k` memories.
///
/// Plaintext stores with a query go through FTS5 (`3k` candidates, BM25 order).
/// Encrypted stores cannot search ciphertext, so they decrypt the `8k` newest
/// rows and substring-match content and tags in-process. Without a query both
/// modes take the `k` newest rows. Kind and tag filters then apply, followed by
/// an optional salience sort.
pub fn recall(conn: &Connection, codec: &FieldCodec, query: &RecallQuery) -> Result<Vec<Memory>> {
    if query.k == 0 {
        return Ok(Vec::new());
    }

    let text = query.effective_query();
    let rows = match text {
        Some(text) if !codec.is_encrypted() => {
            fts_candidates(conn, text, candidate_limit(query.k, FTS_CANDIDATE_FACTOR))?
        }
        Some(_) => recent_rows(conn, candidate_limit(query.k, SCAN_CANDIDATE_FACTOR))?,
        None => recent_rows(conn, candidate_limit(query.k, 1))?,
    };

    let needle = text.filter(|_| codec.is_encrypted()).map(str::to_lowercase);
    let want_kinds: HashSet<String> = query.kinds.iter().map(|k| k.trim().to_lowercase()).collect();
    let want_tags: HashSet<String> = query.tags_any.iter().map(|t| t.trim().to_lowercase()).collect();

    let mut items = Vec::with_capacity(rows.len());
    for raw in rows {
        let memory = raw.decode(codec)?;

        if let Some(needle) = &needle {
            if !matches_substring(&memory, needle) {
                continue;
            }
        }
        if !want_kinds.is_empty() && !want_kinds.contains(memory.kind.as_str()) {
            continue;
        }
        if !want_tags.is_empty()
            && !memory
                .tags
                .iter()
                .any(|t| want_tags.contains(&t.to_lowercase()))
        {
            continue;
        }
        items.push(memory);
    }

    if query.sort_by_salience {
        sort_by_salience(&mut items);
    }
    items.truncate(query.k);
    Ok(items)
}

fn candidate_limit(k: usize, factor: usize) -> usize {
    k.saturating_mul(factor).min(MAX_CANDIDATES)
}

/// Stable descending sort by [`crate::memory::types::Salience::score`].
pub(crate) fn sort_by_salience(items: &mut [Memory]) {
    items.sort_by(|a, b| b.salience.score().total_cmp(&a.salience.score()));
}

fn matches_substring(memory: &Memory, needle: &str) -> bool {
    memory.content.to_lowercase().contains(needle)
        || memory.tags.join(" ").to_lowercase().contains(needle)
}

fn fts_candidates(conn: &Connection, query_text: &str, limit: usize) -> Result<Vec<RawMemoryRow>> {
    // Escape the query for FTS5: wrap each word in double quotes to avoid syntax errors
    let escaped = escape_fts_query(query_text);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }

    let columns = qualified_columns("m");
    let mut stmt = conn.prepare(&format!(
        "SELECT {columns} FROM memories_fts f \
         JOIN memories m ON m.id = f.rowid \
         WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![escaped, limit as i64], RawMemoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn recent_rows(conn: &Connection, limit: usize) -> Result<Vec<RawMemoryRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories ORDER BY created_at DESC, id DESC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit as i64], RawMemoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn qualified_columns(alias: &str) -> String {
    MEMORY_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes and joins with spaces
/// so FTS5 treats them as individual terms (implicit AND). Strips empty tokens.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            // Strip any existing quotes and wrap in fresh ones
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Secret;
    use crate::db;
    use crate::memory::store::remember;
    use crate::memory::types::{MemoryKind, NewMemory, Salience};

    fn importance(value: f64) -> Salience {
        Salience {
            importance: value,
            ..Salience::default()
        }
    }

    fn seed(conn: &Connection, codec: &FieldCodec) {
        remember(
            conn,
            codec,
            &NewMemory::new("Grandad takes two sugars in his tea")
                .tags(["family", "Tea"])
                .salience(importance(0.4)),
        )
        .unwrap();
        remember(
            conn,
            codec,
            &NewMemory::new("Dentist appointment moved to Thursday")
                .kind(MemoryKind::Episodic)
                .tags(["health"])
                .salience(importance(0.9)),
        )
        .unwrap();
        remember(
            conn,
            codec,
            &NewMemory::new("Green tea is in the top drawer")
                .tags(["kitchen"])
                .salience(importance(0.7)),
        )
        .unwrap();
    }

    #[test]
    fn escape_fts_query_quotes_words() {
        assert_eq!(escape_fts_query("hello world"), "\"hello\" \"world\"");
        assert_eq!(escape_fts_query("say \"hi\""), "\"say\" \"hi\"");
        assert_eq!(escape_fts_query("   "), "");
        assert_eq!(escape_fts_query("don't-stop"), "\"don't-stop\"");
    }

    #[test]
    fn plaintext_query_uses_fts_and_sorts_by_salience() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        seed(&conn, &codec);

        let hits = recall(&conn, &codec, &RecallQuery::text("tea")).unwrap();
        let contents: Vec<&str> = hits.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Green tea is in the top drawer", "Grandad takes two sugars in his tea"]
        );
    }

    #[test]
    fn encrypted_query_scans_decrypted_rows() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::new(Secret::new("scan-token").as_ref()).unwrap();
        seed(&conn, &codec);

        let hits = recall(&conn, &codec, &RecallQuery::text("TEA")).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Green tea is in the top drawer");

        // Tag text matches too
        let hits = recall(&conn, &codec, &RecallQuery::text("health")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, MemoryKind::Episodic);
    }

    #[test]
    fn kind_and_tag_filters_are_case_insensitive() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        seed(&conn, &codec);

        let query = RecallQuery {
            kinds: vec!["EPISODIC".into()],
            ..RecallQuery::recent(10)
        };
        let hits = recall(&conn, &codec, &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Dentist appointment moved to Thursday");

        let query = RecallQuery {
            tags_any: vec!["tea".into(), "nothing".into()],
            ..RecallQuery::recent(10)
        };
        let hits = recall(&conn, &codec, &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Grandad takes two sugars in his tea");
    }

    #[test]
    fn no_query_returns_most_recent_k() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        seed(&conn, &codec);

        let query = RecallQuery {
            sort_by_salience: false,
            ..RecallQuery::recent(2)
        };
        let hits = recall(&conn, &codec, &query).unwrap();
        let contents: Vec<&str> = hits.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Green tea is in the top drawer", "Dentist appointment moved to Thursday"]
        );
    }

    #[test]
    fn huge_k_saturates_candidate_limit() {
        assert_eq!(candidate_limit(usize::MAX, SCAN_CANDIDATE_FACTOR), MAX_CANDIDATES);
        assert_eq!(candidate_limit(4, FTS_CANDIDATE_FACTOR), 12);

        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::new(Secret::new("scan-token").as_ref()).unwrap();
        seed(&conn, &codec);
        let query = RecallQuery {
            k: usize::MAX,
            ..RecallQuery::text("tea")
        };
        assert_eq!(recall(&conn, &codec, &query).unwrap().len(), 2);

        let plain = FieldCodec::plaintext();
        let conn = db::open_memory_database().unwrap();
        seed(&conn, &plain);
        assert_eq!(recall(&conn, &plain, &query).unwrap().len(), 2);
        let query = RecallQuery::recent(usize::MAX);
        assert_eq!(recall(&conn, &plain, &query).unwrap().len(), 3);
    }

    #[test]
    fn zero_k_is_empty() {
        let conn = db::open_memory_database().unwrap();
        let codec = FieldCodec::plaintext();
        seed(&conn, &codec);
        assert!(recall(&conn, &codec, &RecallQuery::recent(0)).unwrap().is_empty());
    }
}
