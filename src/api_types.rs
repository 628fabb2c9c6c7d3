use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// Annotation exports are loosely typed: numbers arrive as numbers, numeric
// strings or null, and nested objects are sometimes missing or scalar. Every
// field deserializes leniently and numeric fields stay raw for coercion.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiAnnotation {
    #[serde(default, deserialize_with = "lenient_list")]
    pub entities: Option<Vec<ApiEntity>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub keywords: Option<Vec<ApiEntity>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEntity {
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default)]
    pub relevance: Value,
    #[serde(default, deserialize_with = "lenient")]
    pub sentiment: Option<ApiSentiment>,
    #[serde(default, deserialize_with = "lenient")]
    pub emotion: Option<ApiEmotion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSentiment {
    #[serde(default)]
    pub score: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEmotion {
    #[serde(default)]
    pub anger: Value,
    #[serde(default)]
    pub disgust: Value,
    #[serde(default)]
    pub fear: Value,
    #[serde(default)]
    pub joy: Value,
    #[serde(default)]
    pub sadness: Value,
}

/// Deserialize `T` if the value has the right shape, otherwise `None`.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(de)?;
    Ok(serde_json::from_value(raw).ok())
}

/// An array keeps every element that decodes; a malformed element drops
/// only itself. Anything other than an array is `None`.
fn lenient_list<'de, D, T>(de: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(de)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}
