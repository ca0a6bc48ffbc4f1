/// Attach the server-computed score to materialized rows.
///
/// The score is read once, at materialization, and carried as-is: no
/// rounding, no re-derivation. Decode failures are per row so one bad value
/// does not discard the rest of a result set.

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use crate::errors::Bm25Error;
use crate::score::{Relevance, SCORE_ALIAS};

/// A row plus its BM25 score (lower is more relevant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow<R> {
    #[serde(flatten)]
    pub row: R,
    pub bm25_score: f64,
}

impl<R> ScoredRow<R> {
    pub fn into_inner(self) -> R {
        self.row
    }
}

/// Attach `raw_score` to `row`. NULL and NaN are not valid scores.
pub fn decorate<R>(row: R, raw_score: Option<f64>) -> Result<ScoredRow<R>, Bm25Error> {
    match raw_score {
        None => Err(Bm25Error::ScoreDecode("server returned NULL score".to_string())),
        Some(score) if score.is_nan() => {
            Err(Bm25Error::ScoreDecode("server returned NaN score".to_string()))
        }
        Some(score) => Ok(ScoredRow { row, bm25_score: score }),
    }
}

/// Decode `R` and the `bm25_score` column from one result row.
pub fn decode_scored_row<R>(row: &PgRow) -> Result<ScoredRow<R>, Bm25Error>
where
    R: for<'r> FromRow<'r, PgRow>,
{
    let raw: Option<f64> = row
        .try_get(SCORE_ALIAS)
        .map_err(|e| Bm25Error::ScoreDecode(e.to_string()))?;
    let decoded = R::from_row(row).map_err(|e| Bm25Error::Storage(e.to_string()))?;
    decorate(decoded, raw)
}

/// Decorated result set, one entry per server row, in server order.
#[derive(Debug)]
pub struct ScoredRows<R> {
    rows: Vec<Result<ScoredRow<R>, Bm25Error>>,
}

impl<R> Default for ScoredRows<R> {
    fn default() -> Self {
        ScoredRows { rows: Vec::new() }
    }
}

impl<R> ScoredRows<R> {
    pub fn new(rows: Vec<Result<ScoredRow<R>, Bm25Error>>) -> Self {
        ScoredRows { rows }
    }

    pub fn from_pg_rows(rows: &[PgRow]) -> Self
    where
        R: for<'r> FromRow<'r, PgRow>,
    {
        ScoredRows::new(rows.iter().map(decode_scored_row::<R>).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Result<ScoredRow<R>, Bm25Error>> {
        self.rows.iter()
    }

    /// Number of rows that failed to decode.
    pub fn failed(&self) -> usize {
        self.rows.iter().filter(|r| r.is_err()).count()
    }

    /// Strict: the first decode error aborts.
    pub fn into_rows(self) -> Result<Vec<ScoredRow<R>>, Bm25Error> {
        self.rows.into_iter().collect()
    }

    /// Lenient: keep the good rows, hand back the errors separately.
    pub fn partition(self) -> (Vec<ScoredRow<R>>, Vec<Bm25Error>) {
        let mut ok = Vec::with_capacity(self.rows.len());
        let mut errors = Vec::new();
        for row in self.rows {
            match row {
                Ok(row) => ok.push(row),
                Err(e) => errors.push(e),
            }
        }
        (ok, errors)
    }
}

impl<R> IntoIterator for ScoredRows<R> {
    type Item = Result<ScoredRow<R>, Bm25Error>;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Re-order already scored rows best first. Scores are compared, never
/// recomputed; equal scores keep their relative order.
pub fn sort_best_first<R>(rows: &mut [ScoredRow<R>]) {
    rows.sort_by(|a, b| Relevance::cmp(a.bm25_score, b.bm25_score));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Article {
        id: i64,
        title: String,
    }

    fn article(id: i64) -> Article {
        Article { id, title: format!("article {}", id) }
    }

    #[test]
    fn test_decorate_keeps_exact_score() {
        let score = -1.234_567_890_123_4;
        let scored = decorate(article(1), Some(score)).unwrap();
        assert_eq!(scored.bm25_score.to_bits(), score.to_bits());
        assert_eq!(scored.into_inner(), article(1));
    }

    #[test]
    fn test_decorate_rejects_null_and_nan() {
        assert!(matches!(decorate(article(1), None), Err(Bm25Error::ScoreDecode(_))));
        assert!(matches!(decorate(article(1), Some(f64::NAN)), Err(Bm25Error::ScoreDecode(_))));
    }

    #[test]
    fn test_partition_keeps_good_rows() {
        let rows = ScoredRows::new(vec![
            decorate(article(1), Some(-2.0)),
            decorate(article(2), None),
            decorate(article(3), Some(-0.5)),
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.failed(), 1);

        let (ok, errors) = rows.partition();
        assert_eq!(ok.iter().map(|r| r.row.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_into_rows_is_strict() {
        let rows = ScoredRows::new(vec![decorate(article(1), Some(-2.0)), decorate(article(2), None)]);
        assert!(rows.into_rows().is_err());
    }

    #[test]
    fn test_sort_best_first_does_not_touch_scores() {
        let mut rows = vec![
            decorate(article(1), Some(-0.5)).unwrap(),
            decorate(article(2), Some(-3.0)).unwrap(),
            decorate(article(3), Some(-1.5)).unwrap(),
        ];
        sort_best_first(&mut rows);
        assert_eq!(rows.iter().map(|r| r.row.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(rows.iter().map(|r| r.bm25_score).collect::<Vec<_>>(), vec![-3.0, -1.5, -0.5]);
    }

    #[test]
    fn test_scored_row_serializes_flat() {
        let scored = decorate(article(7), Some(-1.0)).unwrap();
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["bm25_score"], -1.0);
    }
}
