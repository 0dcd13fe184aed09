use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;

/// Builds the storage key for a target name:
/// `<yyyyMMddHHmmss>_<uuid without dashes><.ext>`.
///
/// Only the extension of the caller's name survives, reduced to ASCII
/// alphanumerics, so keys are always safe to use as copy sources.
pub fn generate_object_key(target_name: &str) -> String {
    object_key_at(target_name, Utc::now(), Uuid::new_v4())
}

fn object_key_at(target_name: &str, now: DateTime<Utc>, id: Uuid) -> String {
    let timestamp = now.format("%Y%m%d%H%M%S");
    match extension(target_name) {
        Some(ext) => format!("{}_{}.{}", timestamp, id.simple(), ext),
        None => format!("{}_{}", timestamp, id.simple()),
    }
}

fn extension(target_name: &str) -> Option<String> {
    let ext: String = Path::new(target_name)
        .extension()
        .and_then(|e| e.to_str())?
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();

    if ext.is_empty() { None } else { Some(ext) }
}
