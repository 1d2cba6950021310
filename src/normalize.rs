use std::collections::HashSet;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DeployLensError, Result};

/// The shapes a backend response body is accepted in.
///
/// Endpoints are inconsistent about whether they return a bare array, an
/// object wrapping the array under a named field, or a lone record. The
/// shape is decided once here so call sites only ever see a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Empty,
    Array(Vec<Value>),
    Wrapped { field: String, items: Vec<Value> },
    Single(Value),
}

impl ResponseShape {
    /// Classifies a decoded body.
    ///
    /// `wrapper_fields` lists, in priority order, the object fields that may
    /// hold the record array for the endpoint at hand. A wrapper field that is
    /// `null` counts as an empty array; a wrapper field holding a single object
    /// counts as a one-element array.
    pub fn classify(body: Value, wrapper_fields: &[&str]) -> Self {
        match body {
            Value::Null => Self::Empty,
            Value::Array(items) => Self::Array(items),
            Value::Object(mut map) => {
                let field = wrapper_fields
                    .iter()
                    .find(|field| map.contains_key(**field))
                    .map(|field| (*field).to_string());

                match field {
                    Some(field) => {
                        let items = match map.remove(&field) {
                            Some(Value::Array(items)) => items,
                            Some(Value::Null) | None => Vec::new(),
                            Some(single) => vec![single],
                        };
                        Self::Wrapped { field, items }
                    }
                    None if map.is_empty() => Self::Empty,
                    None => Self::Single(Value::Object(map)),
                }
            }
            scalar => Self::Single(scalar),
        }
    }

    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::Array(items) | Self::Wrapped { items, .. } => items,
            Self::Single(value) => vec![value],
        }
    }
}

/// Decodes a response body into an ordered sequence of records.
///
/// `null` elements inside an array are skipped. Any element that does not
/// decode as `T` fails the whole response with [`DeployLensError::Decode`].
pub fn normalize<T: DeserializeOwned>(
    endpoint: &str,
    body: Value,
    wrapper_fields: &[&str],
) -> Result<Vec<T>> {
    ResponseShape::classify(body, wrapper_fields)
        .into_items()
        .into_iter()
        .filter(|value| !value.is_null())
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value(value).map_err(|e| DeployLensError::Decode {
                endpoint: endpoint.to_string(),
                detail: format!("record {index}: {e}"),
            })
        })
        .collect()
}

/// Keeps the first record for every key, in original order.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .fold(Vec::new(), |mut kept, item| {
            if seen.insert(key(&item)) {
                kept.push(item);
            }
            kept
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Named {
        name: String,
    }

    fn named(name: &str) -> Named {
        Named {
            name: name.to_string(),
        }
    }

    mod classify {
        use super::*;

        #[test]
        fn null_body_is_empty() {
            assert_eq!(ResponseShape::classify(Value::Null, &["value"]), ResponseShape::Empty);
        }

        #[test]
        fn bare_array_is_kept() {
            let shape = ResponseShape::classify(json!([{"name": "A"}]), &["value"]);
            assert_eq!(shape, ResponseShape::Array(vec![json!({"name": "A"})]));
        }

        #[test]
        fn wrapped_array_uses_first_matching_field() {
            let shape = ResponseShape::classify(
                json!({"count": 1, "pipelines": [{"name": "A"}], "value": []}),
                &["pipelines", "value"],
            );
            assert_eq!(
                shape,
                ResponseShape::Wrapped {
                    field: "pipelines".to_string(),
                    items: vec![json!({"name": "A"})],
                }
            );
        }

        #[test]
        fn null_wrapper_field_is_empty_sequence() {
            let shape = ResponseShape::classify(json!({"value": null}), &["value"]);
            assert!(shape.into_items().is_empty());
        }

        #[test]
        fn object_without_wrapper_is_single_record() {
            let shape = ResponseShape::classify(json!({"name": "A"}), &["value"]);
            assert_eq!(shape, ResponseShape::Single(json!({"name": "A"})));
        }

        #[test]
        fn empty_object_is_empty() {
            assert_eq!(ResponseShape::classify(json!({}), &["value"]), ResponseShape::Empty);
        }
    }

    mod normalize {
        use super::*;

        #[test]
        fn all_shapes_produce_sequences() {
            let from_array: Vec<Named> =
                normalize("t", json!([{"name": "A"}, {"name": "B"}]), &[]).unwrap();
            let from_wrapped: Vec<Named> =
                normalize("t", json!({"value": [{"name": "A"}]}), &["value"])
                    .unwrap();
            let from_single: Vec<Named> =
                normalize("t", json!({"name": "A"}), &["value"]).unwrap();
            let from_null: Vec<Named> = normalize("t", Value::Null, &[]).unwrap();

            assert_eq!(from_array, vec![named("A"), named("B")]);
            assert_eq!(from_wrapped, vec![named("A")]);
            assert_eq!(from_single, vec![named("A")]);
            assert!(from_null.is_empty());
        }

        #[test]
        fn skips_null_elements() {
            let items: Vec<Named> =
                normalize("t", json!([null, {"name": "A"}]), &[]).unwrap();
            assert_eq!(items, vec![named("A")]);
        }

        #[test]
        fn malformed_record_is_a_decode_error() {
            let result: Result<Vec<Named>> =
                normalize("projects", json!([{"name": "A"}, {"title": 1}]), &[]);
            match result {
                Err(DeployLensError::Decode { endpoint, detail }) => {
                    assert_eq!(endpoint, "projects");
                    assert!(detail.starts_with("record 1"));
                }
                other => panic!("expected decode error, got {other:?}"),
            }
        }
    }

    mod dedup_by_key {
        use super::*;

        #[test]
        fn keeps_first_occurrence_in_order() {
            let items = vec![named("A"), named("B"), named("A")];
            let unique = dedup_by_key(items, |item| item.name.clone());
            assert_eq!(unique, vec![named("A"), named("B")]);
        }

        #[test]
        fn is_idempotent() {
            let items = vec![named("C"), named("A"), named("C"), named("B"), named("A")];
            let once = dedup_by_key(items, |item| item.name.clone());
            let twice = dedup_by_key(once.clone(), |item| item.name.clone());
            assert_eq!(once, twice);
            assert_eq!(once, vec![named("C"), named("A"), named("B")]);
        }

        #[test]
        fn empty_input_stays_empty() {
            let unique = dedup_by_key(Vec::<Named>::new(), |item| item.name.clone());
            assert!(unique.is_empty());
        }
    }
}
