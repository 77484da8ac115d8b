//! The `Random` resource.
//!
//! Creating a `Random` produces a string of `length` characters drawn from
//! [`CHARSET`]. During preview the result is left unset.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::infer::{self, InferSchema, Resource};
use crate::schema::Attribute;

/// Characters a generated result is drawn from.
pub const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Inputs of a `Random` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomArgs {
    /// Number of characters to generate.
    pub length: usize,
}

impl InferSchema for RandomArgs {
    fn attributes() -> Vec<(&'static str, Attribute)> {
        vec![(
            "length",
            infer::input::<usize>()
                .with_description("Number of characters in the generated string.")
                .with_force_new(),
        )]
    }
}

/// State of a `Random` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomState {
    /// The inputs the resource was created with.
    #[serde(flatten)]
    pub args: RandomArgs,
    /// The generated string. `None` while previewing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl InferSchema for RandomState {
    fn attributes() -> Vec<(&'static str, Attribute)> {
        let mut attrs = RandomArgs::attributes();
        attrs.push((
            "result",
            infer::output::<String>().with_description("The generated string."),
        ));
        attrs
    }
}

/// Controller for the `Random` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct Random;

#[async_trait::async_trait]
impl Resource for Random {
    const NAME: &'static str = "Random";
    type Args = RandomArgs;
    type State = RandomState;

    async fn create(
        &self,
        name: &str,
        input: RandomArgs,
        preview: bool,
    ) -> Result<(String, RandomState), ProviderError> {
        let mut state = RandomState {
            args: input,
            result: None,
        };
        if preview {
            return Ok((name.to_string(), state));
        }

        debug!(name, length = state.args.length, "Generating random string");
        state.result = Some(make_random(state.args.length));
        Ok((name.to_string(), state))
    }
}

/// Generate `length` characters from a generator seeded with the current time.
pub fn make_random(length: usize) -> String {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default();
    random_string(&mut StdRng::seed_from_u64(seed), length)
}

/// Generate `length` characters from [`CHARSET`] using `rng`.
pub fn random_string<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::infer_schema;
    use crate::schema::AttributeType;
    use serde_json::json;

    fn is_alphanumeric(s: &str) -> bool {
        s.bytes().all(|b| CHARSET.contains(&b))
    }

    #[test]
    fn test_charset() {
        assert_eq!(CHARSET.len(), 62);
        assert!(CHARSET.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_string_length_and_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for length in [0, 1, 2, 16, 61, 62, 500] {
            let s = random_string(&mut rng, length);
            assert_eq!(s.len(), length);
            assert!(is_alphanumeric(&s), "unexpected character in {:?}", s);
        }
    }

    #[test]
    fn test_random_string_is_deterministic_for_a_seed() {
        let a = random_string(&mut StdRng::seed_from_u64(42), 32);
        let b = random_string(&mut StdRng::seed_from_u64(42), 32);
        let c = random_string(&mut StdRng::seed_from_u64(43), 32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_make_random() {
        assert_eq!(make_random(0), "");
        let s = make_random(24);
        assert_eq!(s.chars().count(), 24);
        assert!(is_alphanumeric(&s));
    }

    #[tokio::test]
    async fn test_create_populates_result() {
        let (id, state) = Random
            .create("my-random", RandomArgs { length: 12 }, false)
            .await
            .unwrap();

        assert_eq!(id, "my-random");
        assert_eq!(state.args.length, 12);
        let result = state.result.unwrap();
        assert_eq!(result.len(), 12);
        assert!(is_alphanumeric(&result));
    }

    #[tokio::test]
    async fn test_create_zero_length() {
        let (_, state) = Random
            .create("empty", RandomArgs { length: 0 }, false)
            .await
            .unwrap();
        assert_eq!(state.result.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_preview_leaves_result_unset() {
        let (id, state) = Random
            .create("my-random", RandomArgs { length: 12 }, true)
            .await
            .unwrap();

        assert_eq!(id, "my-random");
        assert_eq!(state.args, RandomArgs { length: 12 });
        assert!(state.result.is_none());
    }

    #[test]
    fn test_state_json_shape() {
        let preview = RandomState {
            args: RandomArgs { length: 3 },
            result: None,
        };
        assert_eq!(serde_json::to_value(&preview).unwrap(), json!({"length": 3}));

        let created = RandomState {
            args: RandomArgs { length: 3 },
            result: Some("aB9".to_string()),
        };
        let value = serde_json::to_value(&created).unwrap();
        assert_eq!(value, json!({"length": 3, "result": "aB9"}));
        assert_eq!(serde_json::from_value::<RandomState>(value).unwrap(), created);
    }

    #[test]
    fn test_args_reject_negative_length() {
        assert!(serde_json::from_value::<RandomArgs>(json!({"length": -1})).is_err());
        assert!(serde_json::from_value::<RandomArgs>(json!({})).is_err());
        let args: RandomArgs =
            serde_json::from_value(json!({"length": 5, "result": "ignored"})).unwrap();
        assert_eq!(args.length, 5);
    }

    #[test]
    fn test_inferred_schema() {
        let schema = infer_schema::<Random>();

        let length = schema.attribute("length").unwrap();
        assert_eq!(length.attr_type, AttributeType::Int64);
        assert!(length.flags.required);
        assert!(length.force_new);

        let result = schema.attribute("result").unwrap();
        assert_eq!(result.attr_type, AttributeType::String);
        assert!(result.flags.computed);
        assert!(!result.flags.required);
    }
}
