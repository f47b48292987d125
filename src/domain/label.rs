//! Owner-id escaping for cluster label values.
//!
//! Label values only admit alphanumerics plus `-`, `_` and `.`, while
//! identity-provider subjects routinely contain `|` (e.g. `auth0|12ab`).
//! The transform is deterministic so the same owner always maps to the
//! same selector. It reduces collisions rather than eliminating them: an
//! owner id that literally contains an escape sequence can collide with
//! another owner's escaped form.

/// Label marking every resource this service manages.
pub const LABEL_APP: &str = "app";
/// Value of [`LABEL_APP`] on managed resources.
pub const APP_WORKER: &str = "podbench-worker";
/// Label holding the instance id.
pub const LABEL_INSTANCE: &str = "podbench.io/instance";
/// Label holding the escaped owner id; the selector key for owner-scoped
/// list and watch calls.
pub const LABEL_OWNER: &str = "podbench.io/owner";
/// Label holding the id of the controller process that created the
/// resource. Diagnostic only.
pub const LABEL_CONTROLLER: &str = "podbench.io/controller";
/// Annotation holding the caller-supplied display name. An annotation
/// because display names are free-form and not label-safe.
pub const ANNOTATION_NAME: &str = "podbench.io/name";
/// Annotation holding the per-instance access token.
pub const ANNOTATION_TOKEN: &str = "podbench.io/token";
/// Annotation holding the endpoint resource name, when one exists.
pub const ANNOTATION_ENDPOINT: &str = "podbench.io/endpoint";

/// Selector matching all resources owned by the given owner.
pub fn owner_selector(owner_id: &str) -> String {
    format!("{LABEL_OWNER}={}", escape_owner(owner_id))
}

/// Selector matching the resources of one instance.
pub fn instance_selector(instance_id: &str) -> String {
    format!("{LABEL_INSTANCE}={instance_id}")
}

/// Escape sequence for `|`, the one separator every supported identity
/// provider emits.
const PIPE_ESCAPE: &str = "--_--";
/// Escape sequence for any other label-hostile character, followed by the
/// character's code point.
const CHAR_ESCAPE: &str = "--c";

fn is_label_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Transform an owner id into a label-safe value.
pub fn escape_owner(owner_id: &str) -> String {
    let mut out = String::with_capacity(owner_id.len());
    for c in owner_id.chars() {
        if c == '|' {
            out.push_str(PIPE_ESCAPE);
        } else if is_label_safe(c) {
            out.push(c);
        } else {
            out.push_str(CHAR_ESCAPE);
            out.push_str(&format!("{:x}--", c as u32));
        }
    }
    out
}

/// Reverse [`escape_owner`]. Returns `None` when the value does not
/// round-trip, which means it was not produced by this transform.
pub fn unescape_owner(label: &str) -> Option<String> {
    let mut out = String::with_capacity(label.len());
    let mut rest = label;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(PIPE_ESCAPE) {
            out.push('|');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(CHAR_ESCAPE) {
            let (code, tail) = tail.split_once("--")?;
            let code = u32::from_str_radix(code, 16).ok()?;
            out.push(char::from_u32(code)?);
            rest = tail;
        } else {
            let c = rest.chars().next()?;
            if !is_label_safe(c) {
                return None;
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_uses_fixed_escape() {
        assert_eq!(escape_owner("auth0|12ab34"), "auth0--_--12ab34");
    }

    #[test]
    fn safe_ids_pass_through() {
        assert_eq!(escape_owner("user-1_2.3"), "user-1_2.3");
    }

    #[test]
    fn hostile_characters_are_encoded() {
        let escaped = escape_owner("user@example.com");
        assert!(!escaped.contains('@'));
        assert_eq!(unescape_owner(&escaped).as_deref(), Some("user@example.com"));
    }

    #[test]
    fn round_trips() {
        for owner in ["auth0|x", "google-oauth2|105", "plain", "a|b|c", "u@h:9/p"] {
            let escaped = escape_owner(owner);
            assert!(escaped.chars().all(is_label_safe), "unsafe: {escaped}");
            assert_eq!(unescape_owner(&escaped).as_deref(), Some(owner));
        }
    }

    #[test]
    fn distinct_owners_stay_distinct() {
        assert_ne!(escape_owner("a|b"), escape_owner("a?b"));
        assert_ne!(escape_owner("a|b"), escape_owner("ab"));
    }

    #[test]
    fn foreign_values_do_not_unescape() {
        assert_eq!(unescape_owner("has space"), None);
    }
}
