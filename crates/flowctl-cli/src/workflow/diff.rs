//! Field-level differences between two documents.

use serde_json::Value;

use super::document::ResourceDocument;

/// One leaf-level difference, addressed by a dotted/indexed path such as
/// `properties.definition.actions.Send_email` or `properties.statuses[0]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldChange {
    Added { path: String, value: Value },
    Removed { path: String, value: Value },
    Changed { path: String, before: Value, after: Value },
}

#[cfg(test)]
impl FieldChange {
    pub(crate) fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Changed { path, .. } => {
                path
            }
        }
    }
}

/// Proposed replacement held in memory between diff and submission.
#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    pub(crate) original: ResourceDocument,
    pub(crate) replacement: ResourceDocument,
    pub(crate) changes: Vec<FieldChange>,
}

impl PendingChange {
    pub(crate) fn new(original: ResourceDocument, replacement: ResourceDocument) -> Self {
        let changes = diff(original.as_value(), replacement.as_value());
        Self {
            original,
            replacement,
            changes,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Ordered changes turning `before` into `after`. Object keys are visited in
/// document order: removals and modifications first, then additions.
pub(crate) fn diff(before: &Value, after: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    walk("", before, after, &mut changes);
    changes
}

fn walk(path: &str, before: &Value, after: &Value, changes: &mut Vec<FieldChange>) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = key_path(path, key);
                match new.get(key) {
                    Some(new_value) => walk(&child, old_value, new_value, changes),
                    None => changes.push(FieldChange::Removed {
                        path: child,
                        value: old_value.clone(),
                    }),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    changes.push(FieldChange::Added {
                        path: key_path(path, key),
                        value: new_value.clone(),
                    });
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            for (index, (old_item, new_item)) in old.iter().zip(new).enumerate() {
                walk(&format!("{path}[{index}]"), old_item, new_item, changes);
            }
            for (index, removed) in old.iter().enumerate().skip(new.len()) {
                changes.push(FieldChange::Removed {
                    path: format!("{path}[{index}]"),
                    value: removed.clone(),
                });
            }
            for (index, added) in new.iter().enumerate().skip(old.len()) {
                changes.push(FieldChange::Added {
                    path: format!("{path}[{index}]"),
                    value: added.clone(),
                });
            }
        }
        _ if before == after => {}
        _ => changes.push(FieldChange::Changed {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            before: before.clone(),
            after: after.clone(),
        }),
    }
}

fn key_path(parent: &str, key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '@' || ch == '-');
    match (parent.is_empty(), plain) {
        (true, true) => key.to_string(),
        (false, true) => format!("{parent}.{key}"),
        (_, false) => format!("{parent}[{key:?}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_changes() {
        let doc = json!({"properties": {"state": "Started", "tags": [1, 2]}});
        assert!(diff(&doc, &doc.clone()).is_empty());
    }

    #[test]
    fn changes_are_reported_in_document_order() {
        let before = json!({
            "name": "F1",
            "properties": {"displayName": "Old", "state": "Stopped", "legacy": 1}
        });
        let after = json!({
            "name": "F1",
            "properties": {"displayName": "New", "state": "Stopped", "owner": "me"}
        });

        assert_eq!(
            diff(&before, &after),
            vec![
                FieldChange::Changed {
                    path: "properties.displayName".into(),
                    before: json!("Old"),
                    after: json!("New"),
                },
                FieldChange::Removed {
                    path: "properties.legacy".into(),
                    value: json!(1),
                },
                FieldChange::Added {
                    path: "properties.owner".into(),
                    value: json!("me"),
                },
            ]
        );
    }

    #[test]
    fn arrays_are_compared_by_index() {
        let before = json!({"list": ["a", "b", "c"]});
        let after = json!({"list": ["a", "x"]});
        let paths: Vec<String> = diff(&before, &after)
            .iter()
            .map(|change| change.path().to_string())
            .collect();
        assert_eq!(paths, vec!["list[1]", "list[2]"]);
    }

    #[test]
    fn unusual_keys_are_quoted() {
        let before = json!({"properties": {"a.b": 1}});
        let after = json!({"properties": {"a.b": 2}});
        assert_eq!(diff(&before, &after)[0].path(), "properties[\"a.b\"]");
    }

    #[test]
    fn type_changes_are_leaf_changes() {
        let before = json!({"value": {"nested": true}});
        let after = json!({"value": "flat"});
        assert_eq!(
            diff(&before, &after),
            vec![FieldChange::Changed {
                path: "value".into(),
                before: json!({"nested": true}),
                after: json!("flat"),
            }]
        );
    }
}
