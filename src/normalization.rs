use serde::{Deserialize, Deserializer};

/// Normalizes user-supplied text by stripping surrounding whitespace
/// and decomposing it into Unicode Normalization Form D. Phone
/// numbers go through this before they are used as correlation keys.
///
/// ```
/// use reunite::normalization::normalize;
/// assert_eq!(normalize(" 555-1 "), "555-1");
/// ```
pub fn normalize(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfd().to_string()
}

/// Deserializes a `String` after running it through `normalize`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?;
    Ok(normalize(s))
}
