//! Built-in work units.

use futures::future::BoxFuture;
use serde_json::{json, Map};

use dagflow_core::traits::{UnitError, WorkUnit};
use dagflow_core::types::{SlotValues, Value};

fn single(slot: &str, value: Value) -> SlotValues {
    let mut out = SlotValues::new();
    out.insert(slot.to_string(), value);
    out
}

/// Passes every input through unchanged.
pub struct IdentityUnit;

impl WorkUnit for IdentityUnit {
    fn name(&self) -> &str {
        "identity"
    }

    fn execute(
        &self,
        inputs: SlotValues,
    ) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>> {
        Box::pin(async move { Ok(inputs) })
    }
}

/// Adds up every numeric input (arrays of numbers are summed element-wise
/// into the total). Output slot: `sum`.
pub struct SumUnit;

impl SumUnit {
    fn total(inputs: &SlotValues) -> std::result::Result<Value, UnitError> {
        let mut ints: i64 = 0;
        let mut floats: f64 = 0.0;
        let mut any_float = false;

        let mut add = |slot: &str, v: &Value| -> std::result::Result<(), UnitError> {
            if let Some(i) = v.as_i64() {
                ints = ints
                    .checked_add(i)
                    .ok_or_else(|| UnitError::new("sum: integer overflow"))?;
            } else if let Some(f) = v.as_f64() {
                floats += f;
                any_float = true;
            } else {
                return Err(UnitError::new(format!(
                    "sum: slot '{slot}' is not a number: {v}"
                )));
            }
            Ok(())
        };

        for (slot, value) in inputs {
            match value {
                Value::Array(items) => {
                    for item in items {
                        add(slot, item)?;
                    }
                }
                Value::Null => {}
                other => add(slot, other)?,
            }
        }

        if any_float {
            Ok(json!(ints as f64 + floats))
        } else {
            Ok(json!(ints))
        }
    }
}

impl WorkUnit for SumUnit {
    fn name(&self) -> &str {
        "sum"
    }

    fn execute(
        &self,
        inputs: SlotValues,
    ) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>> {
        let result = Self::total(&inputs).map(|total| single("sum", total));
        Box::pin(async move { result })
    }
}

/// Joins every input into one string, in slot-name order. Strings are used
/// verbatim, other values as JSON. An optional `separator` input is not
/// itself joined. Output slot: `text`.
pub struct ConcatUnit;

impl WorkUnit for ConcatUnit {
    fn name(&self) -> &str {
        "concat"
    }

    fn execute(
        &self,
        mut inputs: SlotValues,
    ) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>> {
        Box::pin(async move {
            let separator = match inputs.remove("separator") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let parts: Vec<String> = inputs
                .into_values()
                .filter(|v| !v.is_null())
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            Ok(single("text", Value::String(parts.join(&separator))))
        })
    }
}

/// Merges inputs into one object, in slot-name order. Object inputs are
/// flattened into it (later slots win on key clashes); any other value is
/// stored under its slot name. Output slot: `merged`.
pub struct MergeUnit;

impl WorkUnit for MergeUnit {
    fn name(&self) -> &str {
        "merge"
    }

    fn execute(
        &self,
        inputs: SlotValues,
    ) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>> {
        Box::pin(async move {
            let mut merged = Map::new();
            for (slot, value) in inputs {
                match value {
                    Value::Object(fields) => merged.extend(fields),
                    other => {
                        merged.insert(slot, other);
                    }
                }
            }
            Ok(single("merged", Value::Object(merged)))
        })
    }
}

/// Always fails, with the `message` input if one is given.
pub struct FailUnit;

impl WorkUnit for FailUnit {
    fn name(&self) -> &str {
        "fail"
    }

    fn execute(
        &self,
        inputs: SlotValues,
    ) -> BoxFuture<'_, std::result::Result<SlotValues, UnitError>> {
        let message = match inputs.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unit failed".to_string(),
        };
        Box::pin(async move { Err(UnitError::new(message)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, Value)]) -> SlotValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_identity() {
        let i = inputs(&[("a", json!(1)), ("b", json!("x"))]);
        assert_eq!(IdentityUnit.execute(i.clone()).await.unwrap(), i);
    }

    #[tokio::test]
    async fn test_sum_integers_and_arrays() {
        let i = inputs(&[("a", json!(2)), ("b", json!([3, 4])), ("c", Value::Null)]);
        let out = SumUnit.execute(i).await.unwrap();
        assert_eq!(out["sum"], json!(9));
    }

    #[tokio::test]
    async fn test_sum_mixed_float() {
        let i = inputs(&[("a", json!(1)), ("b", json!(0.5))]);
        let out = SumUnit.execute(i).await.unwrap();
        assert_eq!(out["sum"], json!(1.5));
    }

    #[tokio::test]
    async fn test_sum_rejects_non_numbers() {
        let i = inputs(&[("a", json!("two"))]);
        let err = SumUnit.execute(i).await.unwrap_err();
        assert!(err.message.contains("'a'"));
    }

    #[tokio::test]
    async fn test_concat_in_slot_order() {
        let i = inputs(&[
            ("b", json!("world")),
            ("a", json!("hello")),
            ("separator", json!(" ")),
        ]);
        let out = ConcatUnit.execute(i).await.unwrap();
        assert_eq!(out["text"], json!("hello world"));
    }

    #[tokio::test]
    async fn test_merge_objects_and_scalars() {
        let i = inputs(&[("a", json!({"x": 1, "y": 1})), ("b", json!({"y": 2})), ("c", json!(true))]);
        let out = MergeUnit.execute(i).await.unwrap();
        assert_eq!(out["merged"], json!({"x": 1, "y": 2, "c": true}));
    }

    #[tokio::test]
    async fn test_fail_uses_message() {
        let err = FailUnit
            .execute(inputs(&[("message", json!("boom"))]))
            .await
            .unwrap_err();
        assert_eq!(err.message, "boom");
        let err = FailUnit.execute(SlotValues::new()).await.unwrap_err();
        assert_eq!(err.message, "unit failed");
    }
}
