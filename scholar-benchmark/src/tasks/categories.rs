//! Category label normalization

/// Separator used between sub-labels of a compound category
pub const CATEGORY_SEPARATOR: &str = " & ";

/// Normalize a free-text category label.
///
/// Trims and lowercases, splits on `&`, trims each part, drops repeated
/// parts keeping the first occurrence, and rejoins with `" & "`. The result
/// is a fixed point: normalizing it again changes nothing.
pub fn normalize_category(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    let mut parts: Vec<&str> = Vec::new();
    for part in lowered.split('&').map(str::trim) {
        if !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(CATEGORY_SEPARATOR)
}
