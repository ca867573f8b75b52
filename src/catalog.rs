//! Probe catalogs
//!
//! The built-in catalog covers profile lookup, the `users`, `posts` and
//! `locations` tables, and optional storage listing. Probes that need a second
//! principal or a bucket are left out when those are not configured.
//!
//! Additional probes can be supplied as YAML:
//!
//! ```yaml
//! probes:
//!   - name: comments/insert-as-other
//!     as: caller
//!     operation: create
//!     collection: comments
//!     payload: { author_id: "{{other_user_id}}", body: "should be blocked" }
//!     prefer: [return=representation]
//!     expect: [denied]
//! ```
//!
//! String values are rendered with handlebars in strict mode; an entry that
//! references an unset variable is dropped with a warning.

use crate::classifier::{OwnershipScope, Verdict};
use crate::config::{CatalogVars, RunConfig};
use crate::error::{ProbeError, Result};
use crate::identity::Identities;
use crate::operation::{Operation, Prefer};
use crate::probe::{Capture, Probe};
use crate::resource::{FilterValue, Order, ResourceRef};
use handlebars::Handlebars;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Target of the users cross-update probe when no second principal is given.
pub const PLACEHOLDER_OTHER_ID: &str = "11111111-2222-3333-4444-555555555555";

const USER_FIELDS: &[&str] = &["id", "username", "visibility"];

// =============================================================================
// Built-in catalog
// =============================================================================

pub fn builtin_probes(config: &RunConfig, vars: &CatalogVars) -> Vec<Probe> {
    let identities = config.identities();
    let me = vars.user_id.as_str();
    let other = vars.other_user_id.as_deref();

    let mut probes = Vec::new();
    probes.extend(profile_probes(&identities, me));
    probes.extend(users_probes(&identities, other));
    probes.extend(posts_probes(&identities, me, other, vars.now));
    probes.extend(locations_probes(&identities, me, other));
    if let Some(bucket) = vars.storage_bucket.as_deref() {
        probes.extend(storage_probes(&identities, bucket, me));
    }
    probes
}

fn profile_probes(ids: &Identities, me: &str) -> Vec<Probe> {
    vec![Probe::new(
        "profile/self-lookup",
        ids.caller.clone(),
        Operation::Read,
        ResourceRef::new("users").select(USER_FIELDS).eq("id", me),
    )
    .expect(Verdict::Allowed)
    .scoped_to(OwnershipScope::new("id", me))
    .expect_rows()
    .describe("Caller can read their own users row")]
}

fn users_probes(ids: &Identities, other: Option<&str>) -> Vec<Probe> {
    let target = other.unwrap_or(PLACEHOLDER_OTHER_ID);
    vec![
        Probe::new(
            "users/anon-read",
            ids.anonymous.clone(),
            Operation::Read,
            ResourceRef::new("users").select(USER_FIELDS).limit(3),
        )
        // both are fine: depends on whether profiles are public
        .expect_any(&[Verdict::Allowed, Verdict::Denied])
        .note(Verdict::Allowed, "users are readable anonymously (public profiles)")
        .note(Verdict::Denied, "users are not readable anonymously")
        .describe("Anonymous SELECT on users is either blocked or limited to public fields"),
        Probe::new(
            "users/auth-read",
            ids.caller.clone(),
            Operation::Read,
            ResourceRef::new("users").select(USER_FIELDS).limit(3),
        )
        .expect(Verdict::Allowed)
        .describe("Authenticated SELECT on users succeeds"),
        Probe::new(
            "users/cross-update",
            ids.caller.clone(),
            Operation::update(json!({ "bio": "hack" }), Prefer::default()),
            ResourceRef::new("users").eq("id", target),
        )
        .expect(Verdict::Denied)
        .describe("PATCH of another user's profile is blocked"),
    ]
}

fn posts_probes(ids: &Identities, me: &str, other: Option<&str>, now: i64) -> Vec<Probe> {
    let mut probes = vec![Probe::new(
        "posts/own-read",
        ids.caller.clone(),
        Operation::Read,
        ResourceRef::new("posts")
            .select(&["id", "author_id", "content", "created_at"])
            .order(Order::desc("created_at"))
            .limit(5),
    )
    .expect(Verdict::Allowed)
    .scoped_to(OwnershipScope::new("author_id", me))
    .describe("SELECT on posts returns only the caller's posts")];

    if let Some(other) = other {
        probes.push(
            Probe::new(
                "posts/insert-as-other",
                ids.caller.clone(),
                Operation::create(
                    json!({ "author_id": other, "content": "policy test: should be blocked" }),
                    Prefer::representation(),
                ),
                ResourceRef::new("posts"),
            )
            .expect(Verdict::Denied)
            .describe("INSERT of a post authored by someone else is blocked"),
        );
    }

    probes.push(
        Probe::new(
            "posts/insert-as-self",
            ids.caller.clone(),
            Operation::create(
                json!({ "author_id": me, "content": format!("policy test ok at {}", now) }),
                Prefer::representation(),
            ),
            ResourceRef::new("posts"),
        )
        .expect(Verdict::Allowed)
        .describe("INSERT of a post as the caller succeeds"),
    );

    if let Some(other) = other {
        probes.push(
            Probe::new(
                "posts/find-other",
                ids.caller.clone(),
                Operation::Read,
                ResourceRef::new("posts")
                    .select(&["id", "author_id"])
                    .eq("author_id", other)
                    .limit(1),
            )
            .expect_any(&[Verdict::Allowed, Verdict::Denied])
            .capture("other_post_id", "id")
            .describe("Look up one of the other user's posts for the UPDATE check"),
        );
        probes.push(
            Probe::new(
                "posts/cross-update",
                ids.caller.clone(),
                Operation::update(json!({ "content": "hack attempt" }), Prefer::default()),
                ResourceRef::new("posts").eq_binding("id", "other_post_id"),
            )
            .expect(Verdict::Denied)
            .describe("UPDATE on someone else's post is blocked"),
        );
    }

    probes
}

fn locations_probes(ids: &Identities, me: &str, other: Option<&str>) -> Vec<Probe> {
    let mut probes = vec![
        Probe::new(
            "locations/own-read",
            ids.caller.clone(),
            Operation::Read,
            ResourceRef::new("locations")
                .select(&["id", "lat", "lng", "updated_at"])
                .order(Order::desc("updated_at")),
        )
        .expect(Verdict::Allowed)
        .scoped_to(OwnershipScope::new("id", me))
        .describe("SELECT on locations returns only the caller's location"),
        Probe::new(
            "locations/upsert-self",
            ids.caller.clone(),
            Operation::create(
                json!({ "id": me, "lat": -36.85, "lng": 174.76 }),
                Prefer::upsert(),
            ),
            ResourceRef::new("locations"),
        )
        .expect(Verdict::Allowed)
        .describe("Upsert of the caller's location succeeds"),
    ];

    if let Some(other) = other {
        probes.push(
            Probe::new(
                "locations/upsert-other",
                ids.caller.clone(),
                Operation::create(json!({ "id": other, "lat": 0, "lng": 0 }), Prefer::upsert()),
                ResourceRef::new("locations"),
            )
            .expect(Verdict::Denied)
            .describe("Upsert of another user's location is blocked"),
        );
    }

    probes
}

fn storage_probes(ids: &Identities, bucket: &str, me: &str) -> Vec<Probe> {
    vec![
        Probe::new(
            "storage/anon-list",
            ids.anonymous.clone(),
            Operation::list_objects(me),
            ResourceRef::new(bucket),
        )
        .expect_any(&[Verdict::Allowed, Verdict::Denied])
        .note(Verdict::Allowed, "bucket is public")
        .note(Verdict::Denied, "bucket likely private")
        .describe("Anonymous listing is blocked unless the bucket is public"),
        Probe::new(
            "storage/auth-list",
            ids.caller.clone(),
            Operation::list_objects(me),
            ResourceRef::new(bucket),
        )
        .expect(Verdict::Allowed)
        .describe("Caller can list their own prefix"),
    ]
}

// =============================================================================
// YAML catalogs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Principal {
    Anonymous,
    Caller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OperationKind {
    Read,
    Create,
    Update,
    ListObjects,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeEntry {
    name: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(rename = "as")]
    principal: Principal,
    operation: OperationKind,
    collection: String,
    #[serde(default)]
    select: Option<Vec<String>>,
    #[serde(default)]
    filters: BTreeMap<String, String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    prefer: Prefer,
    #[serde(default)]
    prefix: Option<String>,
    expect: Vec<Verdict>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    scope: Option<OwnershipScope>,
    #[serde(default)]
    capture: Option<Capture>,
    #[serde(default)]
    require_rows: bool,
}

impl ProbeEntry {
    fn into_probe(self, ids: &Identities) -> Result<Probe> {
        if self.expect.is_empty() {
            return Err(ProbeError::catalog(format!(
                "Probe '{}' has an empty expect list",
                self.name
            )));
        }

        let identity = match self.principal {
            Principal::Anonymous => ids.anonymous.clone(),
            Principal::Caller => ids.caller.clone(),
        };

        let payload = match self.payload {
            None => json!({}),
            Some(payload @ Value::Object(_)) => payload,
            Some(_) => {
                return Err(ProbeError::catalog(format!(
                    "Probe '{}': payload must be a mapping",
                    self.name
                )));
            }
        };
        let operation = match self.operation {
            OperationKind::Read => Operation::Read,
            OperationKind::Create => Operation::create(payload, self.prefer),
            OperationKind::Update => Operation::update(payload, self.prefer),
            OperationKind::ListObjects => {
                Operation::list_objects(self.prefix.unwrap_or_default())
            }
        };

        let mut resource = ResourceRef::new(self.collection);
        if let Some(fields) = self.select {
            resource = resource.select_fields(fields);
        }
        for (field, value) in &self.filters {
            resource = resource.filter(field.clone(), FilterValue::parse(value));
        }
        if let Some(order) = self.order.as_deref() {
            resource = resource.order(Order::parse(order)?);
        }
        if let Some(limit) = self.limit {
            resource = resource.limit(limit);
        }

        let mut probe = Probe::new(self.name, identity, operation, resource)
            .expect_any(&self.expect)
            .describe(self.description);
        if let Some(group) = self.group {
            probe = probe.in_group(group);
        }
        probe.scope = self.scope;
        probe.capture = self.capture;
        probe.require_rows = self.require_rows;
        Ok(probe)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    probes: Vec<serde_yaml::Value>,
}

pub fn load_catalog(path: &Path, vars: &CatalogVars, ids: &Identities) -> Result<Vec<Probe>> {
    let text = std::fs::read_to_string(path)?;
    parse_catalog(&text, vars, ids)
}

pub fn parse_catalog(text: &str, vars: &CatalogVars, ids: &Identities) -> Result<Vec<Probe>> {
    let file: CatalogFile = serde_yaml::from_str(text)?;
    let data = serde_json::to_value(vars)?;

    let mut hb = Handlebars::new();
    hb.set_strict_mode(true);
    hb.register_escape_fn(handlebars::no_escape);

    let mut probes = Vec::with_capacity(file.probes.len());
    for (position, entry) in file.probes.into_iter().enumerate() {
        let raw = serde_json::to_value(entry)?;
        let rendered = match render_strings(&hb, raw, &data) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(entry = position, error = %err, "Dropping catalog probe");
                continue;
            }
        };

        let parsed: ProbeEntry = serde_json::from_value(rendered).map_err(|e| {
            ProbeError::catalog(format!("Catalog entry {}: {}", position + 1, e))
        })?;
        debug!(probe = %parsed.name, "Loaded catalog probe");
        probes.push(parsed.into_probe(ids)?);
    }

    Ok(probes)
}

fn render_strings(
    hb: &Handlebars<'_>,
    value: Value,
    data: &Value,
) -> std::result::Result<Value, handlebars::RenderError> {
    Ok(match value {
        Value::String(s) if s.contains("{{") => Value::String(hb.render_template(&s, data)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| render_strings(hb, item, data))
                .collect::<std::result::Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| render_strings(hb, v, data).map(|v| (k, v)))
                .collect::<std::result::Result<_, _>>()?,
        ),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TOKEN: &str = "aaa.bbb.ccc";

    fn config() -> RunConfig {
        RunConfig::new(
            "https://xyz.supabase.co",
            "anon",
            TOKEN,
            Uuid::parse_str("6f1c1a9e-0000-4000-8000-000000000001").unwrap(),
        )
    }

    fn names(probes: &[Probe]) -> Vec<&str> {
        probes.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_minimal_builtin_catalog() {
        let config = config();
        let probes = builtin_probes(&config, &config.vars(chrono::Utc::now()));
        assert_eq!(
            names(&probes),
            vec![
                "profile/self-lookup",
                "users/anon-read",
                "users/auth-read",
                "users/cross-update",
                "posts/own-read",
                "posts/insert-as-self",
                "locations/own-read",
                "locations/upsert-self",
            ]
        );
        let cross = probes.iter().find(|p| p.name == "users/cross-update").unwrap();
        assert_eq!(
            cross.resource.to_string(),
            format!("users?id=eq.{}", PLACEHOLDER_OTHER_ID)
        );
    }

    #[test]
    fn test_full_builtin_catalog_order() {
        let config = config()
            .with_other_user(Uuid::new_v4())
            .with_storage_bucket("profile-pics");
        let probes = builtin_probes(&config, &config.vars(chrono::Utc::now()));
        let names = names(&probes);

        assert_eq!(probes.len(), 14);
        let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(pos("posts/insert-as-self") < pos("posts/find-other"));
        assert!(pos("posts/find-other") < pos("posts/cross-update"));
        assert_eq!(names.last(), Some(&"storage/auth-list"));
    }

    #[test]
    fn test_anonymous_probes_use_anonymous_identity() {
        let config = config().with_storage_bucket("b");
        let probes = builtin_probes(&config, &config.vars(chrono::Utc::now()));
        for name in ["users/anon-read", "storage/anon-list"] {
            let probe = probes.iter().find(|p| p.name == name).unwrap();
            assert!(!probe.identity.is_authenticated(), "{}", name);
            assert!(probe.expected.contains(&Verdict::Allowed));
            assert!(probe.expected.contains(&Verdict::Denied));
        }
    }

    #[test]
    fn test_parse_catalog_renders_vars() {
        let config = config().with_other_user(Uuid::new_v4());
        let vars = config.vars(chrono::Utc::now());
        let yaml = r#"
probes:
  - name: comments/insert-as-other
    as: caller
    operation: create
    collection: comments
    payload: { author_id: "{{other_user_id}}", body: "blocked" }
    prefer: [return=representation]
    expect: [denied]
  - name: comments/own-read
    as: caller
    operation: read
    collection: comments
    select: [id, author_id]
    filters: { author_id: "{{user_id}}" }
    order: created_at.desc
    limit: 10
    expect: [allowed]
    scope: { owner_field: author_id, expected_owner: "{{user_id}}" }
"#;
        let probes = parse_catalog(yaml, &vars, &config.identities()).unwrap();
        assert_eq!(probes.len(), 2);
        match &probes[0].operation {
            Operation::Create { payload, prefer } => {
                assert_eq!(
                    payload.get("author_id").and_then(Value::as_str),
                    vars.other_user_id.as_deref()
                );
                assert_eq!(prefer, &Prefer::representation());
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert_eq!(
            probes[1].resource.to_string(),
            format!(
                "comments?select=id,author_id&author_id=eq.{}&order=created_at.desc&limit=10",
                vars.user_id
            )
        );
        assert_eq!(probes[1].group, "comments");
    }

    #[test]
    fn test_entry_with_unset_var_is_dropped() {
        let config = config();
        let yaml = r#"
probes:
  - name: x/needs-other
    as: caller
    operation: read
    collection: posts
    filters: { author_id: "{{other_user_id}}" }
    expect: [allowed]
  - name: x/anon
    as: anonymous
    operation: read
    collection: posts
    expect: [denied, allowed]
"#;
        let probes =
            parse_catalog(yaml, &config.vars(chrono::Utc::now()), &config.identities()).unwrap();
        assert_eq!(names(&probes), vec!["x/anon"]);
    }

    #[test]
    fn test_unknown_field_and_empty_expect_rejected() {
        let config = config();
        let vars = config.vars(chrono::Utc::now());
        let unknown = "probes:\n  - {name: a, as: caller, operation: read, collection: t, expect: [allowed], bogus: 1}\n";
        assert!(matches!(
            parse_catalog(unknown, &vars, &config.identities()),
            Err(ProbeError::Catalog(_))
        ));

        let empty = "probes:\n  - {name: a, as: caller, operation: read, collection: t, expect: []}\n";
        assert!(matches!(
            parse_catalog(empty, &vars, &config.identities()),
            Err(ProbeError::Catalog(_))
        ));
    }

    #[test]
    fn test_binding_filter_in_catalog() {
        let config = config();
        let yaml = r#"
probes:
  - name: posts/cross-delete-target
    as: caller
    operation: update
    collection: posts
    filters: { id: "@other_post_id" }
    payload: { content: "x" }
    expect: [denied]
"#;
        let probes =
            parse_catalog(yaml, &config.vars(chrono::Utc::now()), &config.identities()).unwrap();
        assert_eq!(probes[0].resource.required_bindings(), vec!["other_post_id"]);
    }

    #[test]
    fn test_self_lookup_requires_a_row() {
        let config = config();
        let probes = builtin_probes(&config, &config.vars(chrono::Utc::now()));
        let lookup = probes.iter().find(|p| p.name == "profile/self-lookup").unwrap();
        assert!(lookup.require_rows);
        assert!(probes
            .iter()
            .filter(|p| p.name != "profile/self-lookup")
            .all(|p| !p.require_rows));
    }

    #[test]
    fn test_require_rows_in_catalog() {
        let config = config();
        let yaml = r#"
probes:
  - name: profile/lookup
    as: caller
    operation: read
    collection: users
    filters: { id: "{{user_id}}" }
    expect: [allowed]
    require_rows: true
"#;
        let probes =
            parse_catalog(yaml, &config.vars(chrono::Utc::now()), &config.identities()).unwrap();
        assert!(probes[0].require_rows);
    }

    #[test]
    fn test_non_mapping_payload_rejected() {
        let config = config();
        let vars = config.vars(chrono::Utc::now());
        for payload in ["[{author_id: a}, {author_id: b}]", "\"hello\"", "42"] {
            let yaml = format!(
                "probes:\n  - {{name: p/bulk, as: caller, operation: create, collection: posts, payload: {}, expect: [denied]}}\n",
                payload
            );
            assert!(
                matches!(
                    parse_catalog(&yaml, &vars, &config.identities()),
                    Err(ProbeError::Catalog(_))
                ),
                "{}",
                payload
            );
        }
    }
}
