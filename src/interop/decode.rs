//! Result decoding - interpreter objects back into native values

use crate::errors::{describe, BridgeError, Result};
use crate::ffi::BorrowedHandle;
use crate::metrics::{MetricsRecord, FIELD_NAMES};
use super::marshal::field_key;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple};
use serde::{Deserialize, Serialize};

/// One entry of a scorer's ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredPod {
    pub pod_name: String,
    pub score: i64,
}

/// Read a `list[tuple[str, int]]` ranking.
pub fn decode_scores(result: BorrowedHandle<'_, '_>) -> Result<Vec<ScoredPod>> {
    let py = result.py();
    let list = result
        .as_bound()
        .downcast::<PyList>()
        .map_err(|e| decode_error(0, e.to_string()))?;

    let mut scores = Vec::with_capacity(list.len());
    for (index, item) in list.iter().enumerate() {
        let pair = item
            .downcast::<PyTuple>()
            .map_err(|e| decode_error(index, e.to_string()))?;
        if pair.len() != 2 {
            return Err(decode_error(index, format!("expected a pair, got {} items", pair.len())));
        }

        // Tuple items are borrowed; the tuple keeps them alive
        let name = pair.get_borrowed_item(0).map_err(|e| decode_error(index, describe(py, &e)))?;
        let score = pair.get_borrowed_item(1).map_err(|e| decode_error(index, describe(py, &e)))?;

        scores.push(ScoredPod {
            pod_name: name.extract().map_err(|e| decode_error(index, describe(py, &e)))?,
            score: score.extract().map_err(|e| decode_error(index, describe(py, &e)))?,
        });
    }

    Ok(scores)
}

/// Read a dict produced by `marshal` back into a record.
pub fn unmarshal(aggregate: BorrowedHandle<'_, '_>) -> Result<MetricsRecord> {
    let py = aggregate.py();
    let dict = aggregate
        .as_bound()
        .downcast::<PyDict>()
        .map_err(|e| decode_error(0, e.to_string()))?;

    let err = |index: usize, e: PyErr| decode_error(index, describe(py, &e));

    Ok(MetricsRecord {
        pod_name: dict_field(dict, 0)?.extract().map_err(|e| err(0, e))?,
        adapter_count: dict_field(dict, 1)?.extract().map_err(|e| err(1, e))?,
        kv_cache_util: dict_field(dict, 2)?.extract().map_err(|e| err(2, e))?,
        queue_count: dict_field(dict, 3)?.extract().map_err(|e| err(3, e))?,
    })
}

fn dict_field<'py>(dict: &Bound<'py, PyDict>, index: usize) -> Result<Bound<'py, PyAny>> {
    let py = dict.py();
    let key = field_key(py, index).ok_or_else(|| decode_error(index, format!("no field at index {}", index)))?;
    dict.get_item(key.as_bound())
        .map_err(|e| decode_error(index, describe(py, &e)))?
        .ok_or_else(|| decode_error(index, format!("missing key {:?}", FIELD_NAMES[index])))
}

fn decode_error(index: usize, cause: String) -> BridgeError {
    BridgeError::Decode { index, cause }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scores_reads_pairs() {
        Python::with_gil(|py| {
            let ranking = PyList::new_bound(py, [("pod1", 10_i64), ("pod2", -5_i64)]);
            let scores = decode_scores((&ranking).into()).unwrap();

            assert_eq!(
                scores,
                vec![
                    ScoredPod { pod_name: "pod1".into(), score: 10 },
                    ScoredPod { pod_name: "pod2".into(), score: -5 },
                ]
            );
        });
    }

    #[test]
    fn test_decode_scores_reports_bad_item() {
        Python::with_gil(|py| {
            let ranking = py.eval_bound("[('pod1', 1), ('pod2', 'high')]", None, None).unwrap();
            let err = decode_scores((&ranking).into()).unwrap_err();

            assert!(matches!(err, BridgeError::Decode { index: 1, .. }));
            assert!(!PyErr::occurred(py));
        });
    }

    #[test]
    fn test_unmarshal_reports_missing_key() {
        Python::with_gil(|py| {
            let dict = py
                .eval_bound("{'pod_name': 'p', 'adapter_count': 1, 'queue_count': 2}", None, None)
                .unwrap();
            let err = unmarshal((&dict).into()).unwrap_err();
            assert!(matches!(err, BridgeError::Decode { index: 2, .. }));
        });
    }
}
