// histo-net/src/payload.rs
//! Request bodies accepted by `POST /install`.
//!
//! The worker has accepted several body shapes over time. They are tried in
//! the fixed order of [`StartEncoding::ALL`] until one is accepted.
use histo_common::model::VersionKey;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartEncoding {
    /// `{version, category, full_assets}`
    VersionCategory,
    /// `{folder, category, full_assets}`
    FolderCategory,
    /// `{version_key, full_assets}`
    VersionKeyField,
    /// `{key, full_assets}`
    KeyField,
    /// the key as a bare JSON string
    BareKey,
}

impl StartEncoding {
    pub const ALL: [StartEncoding; 5] = [
        StartEncoding::VersionCategory,
        StartEncoding::FolderCategory,
        StartEncoding::VersionKeyField,
        StartEncoding::KeyField,
        StartEncoding::BareKey,
    ];

    pub fn body(&self, key: &VersionKey, full_assets: bool) -> Value {
        match self {
            StartEncoding::VersionCategory => json!({
                "version": key.folder(),
                "category": key.category(),
                "full_assets": full_assets,
            }),
            StartEncoding::FolderCategory => json!({
                "folder": key.folder(),
                "category": key.category(),
                "full_assets": full_assets,
            }),
            StartEncoding::VersionKeyField => json!({
                "version_key": key.to_string(),
                "full_assets": full_assets,
            }),
            StartEncoding::KeyField => json!({
                "key": key.to_string(),
                "full_assets": full_assets,
            }),
            StartEncoding::BareKey => Value::String(key.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings_in_priority_order() {
        let key = VersionKey::new("release", "1.2.5").unwrap();
        let bodies: Vec<Value> = StartEncoding::ALL
            .iter()
            .map(|encoding| encoding.body(&key, false))
            .collect();

        assert_eq!(
            bodies[0],
            json!({"version": "1.2.5", "category": "Release", "full_assets": false})
        );
        assert_eq!(
            bodies[1],
            json!({"folder": "1.2.5", "category": "Release", "full_assets": false})
        );
        assert_eq!(
            bodies[2],
            json!({"version_key": "Release/1.2.5", "full_assets": false})
        );
        assert_eq!(bodies[3], json!({"key": "Release/1.2.5", "full_assets": false}));
        assert_eq!(bodies[4], json!("Release/1.2.5"));
    }
}
