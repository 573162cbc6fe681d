use serde::{Deserialize, Serialize};

/// A user-defined category logs can be sorted into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
}

/// A one-tap widget button. The widget captures `text` when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetPreset {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Bucket the user associated with this button, carried for the
    /// application's preset editor. Widget captures are still unsorted.
    #[serde(rename = "bucketId", default)]
    pub bucket_id: Option<String>,
}

pub fn default_icon() -> String {
    "plus.circle".to_string()
}
