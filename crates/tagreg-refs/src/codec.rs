//! The registry tag grammar.
//!
//! Every registry event is stored as one tag whose *name* encodes the event:
//!
//! | Event          | Tag name              |
//! |----------------|-----------------------|
//! | registration   | `artifact@version`    |
//! | deregistration | `artifact@version!`   |
//! | assignment     | `artifact#stage`      |
//! | unassignment   | `artifact#stage!`     |
//! | deprecation    | `artifact@deprecated` |
//!
//! Any of these may carry a `#N` counter suffix (N ≥ 1) so the same action
//! can be recorded more than once. The counter is allocated by scanning the
//! existing tag names, never stored anywhere; two writers that pick the same
//! counter collide on tag creation and one of them fails.
//!
//! Counters are shared by a tag *family*: the tags whose simple name is a
//! prefix of each other. `rf@v1` and `rf@v1!` form one family, as do
//! `rf#prod` and `rf#prod!`. Within one family the counter therefore orders
//! events that land in the same second.
//!
//! Decoding is purely syntactic. Version tokens are only checked against
//! the loose token grammar here; scheme validation happens in the ledger.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tagreg_types::{ArtifactName, StageName, NAME_PATTERN};

/// Loose grammar for the version part of a tag.
pub const VERSION_TOKEN_PATTERN: &str = r"v[0-9A-Za-z][0-9A-Za-z.+\-]*";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<artifact>{NAME_PATTERN})(?:@(?P<deprecated>deprecated)|@(?P<version>{VERSION_TOKEN_PATTERN})(?P<deregister>!)?|#(?P<stage>{NAME_PATTERN})(?P<unassign>!)?)(?:#(?P<counter>[1-9][0-9]*))?$"
    ))
    .expect("tag grammar compiles")
});

/// What a registry tag records, with its version or stage operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagAction {
    Register(String),
    Deregister(String),
    Assign(StageName),
    Unassign(StageName),
    Deprecate,
}

impl TagAction {
    /// The version operand, for registration actions.
    pub fn version(&self) -> Option<&str> {
        match self {
            TagAction::Register(v) | TagAction::Deregister(v) => Some(v),
            _ => None,
        }
    }

    /// The stage operand, for assignment actions.
    pub fn stage(&self) -> Option<&StageName> {
        match self {
            TagAction::Assign(s) | TagAction::Unassign(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` if both actions belong to the same tag family: the
    /// same operand, ignoring whether the action opens or closes it.
    pub fn same_family(&self, other: &TagAction) -> bool {
        match (self, other) {
            (
                TagAction::Register(a) | TagAction::Deregister(a),
                TagAction::Register(b) | TagAction::Deregister(b),
            ) => a == b,
            (
                TagAction::Assign(a) | TagAction::Unassign(a),
                TagAction::Assign(b) | TagAction::Unassign(b),
            ) => a == b,
            (TagAction::Deprecate, TagAction::Deprecate) => true,
            _ => false,
        }
    }

    fn write_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagAction::Register(v) => write!(f, "@{v}"),
            TagAction::Deregister(v) => write!(f, "@{v}!"),
            TagAction::Assign(s) => write!(f, "#{s}"),
            TagAction::Unassign(s) => write!(f, "#{s}!"),
            TagAction::Deprecate => f.write_str("@deprecated"),
        }
    }
}

/// How to pick the counter suffix when encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// Never append a counter.
    Simple,
    /// Always append a counter.
    Counted,
    /// Append a counter only if the simple name's prefix is already in use.
    #[default]
    Auto,
}

/// The fields encoded in a registry tag name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagFields {
    pub artifact: ArtifactName,
    pub action: TagAction,
    pub counter: Option<u32>,
}

impl TagFields {
    pub fn new(artifact: ArtifactName, action: TagAction, counter: Option<u32>) -> Self {
        Self {
            artifact,
            action,
            counter,
        }
    }

    /// Returns `true` if these fields belong to the tag family of `action`
    /// on `artifact`, ignoring the counter.
    pub fn same_prefix(&self, artifact: &ArtifactName, action: &TagAction) -> bool {
        &self.artifact == artifact && self.action.same_family(action)
    }
}

impl fmt::Display for TagFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact.as_str())?;
        self.action.write_body(f)?;
        if let Some(counter) = self.counter {
            write!(f, "#{counter}")?;
        }
        Ok(())
    }
}

/// Decode a tag name. Returns `None` for names outside the grammar.
pub fn decode(name: &str) -> Option<TagFields> {
    let caps = TAG_RE.captures(name)?;
    let artifact = ArtifactName::new(caps.name("artifact")?.as_str()).ok()?;

    let action = if caps.name("deprecated").is_some() {
        TagAction::Deprecate
    } else if let Some(version) = caps.name("version") {
        let version = version.as_str().to_string();
        if caps.name("deregister").is_some() {
            TagAction::Deregister(version)
        } else {
            TagAction::Register(version)
        }
    } else {
        let stage = StageName::new(caps.name("stage")?.as_str()).ok()?;
        if caps.name("unassign").is_some() {
            TagAction::Unassign(stage)
        } else {
            TagAction::Assign(stage)
        }
    };

    let counter = match caps.name("counter") {
        Some(m) => Some(m.as_str().parse::<u32>().ok()?),
        None => None,
    };

    Some(TagFields {
        artifact,
        action,
        counter,
    })
}

/// Highest counter among `existing` names in the same tag family. A
/// counter-less name counts as 0; `None` if no name matches.
fn max_counter<I, S>(artifact: &ArtifactName, action: &TagAction, existing: I) -> Option<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    existing
        .into_iter()
        .filter_map(|name| decode(name.as_ref()))
        .filter(|fields| fields.same_prefix(artifact, action))
        .map(|fields| fields.counter.unwrap_or(0))
        .max()
}

/// One greater than the highest counter among `existing` names in the same
/// tag family.
pub fn next_counter<I, S>(artifact: &ArtifactName, action: &TagAction, existing: I) -> u32
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    max_counter(artifact, action, existing).map_or(1, |max| max.saturating_add(1))
}

/// Encode an action into tag fields, allocating a counter per `naming`.
pub fn encode<I, S>(
    artifact: &ArtifactName,
    action: TagAction,
    naming: NamingMode,
    existing: I,
) -> TagFields
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let counter = match naming {
        NamingMode::Simple => None,
        NamingMode::Counted => Some(next_counter(artifact, &action, existing)),
        NamingMode::Auto => {
            max_counter(artifact, &action, existing).map(|max| max.saturating_add(1))
        }
    };
    TagFields::new(artifact.clone(), action, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(s: &str) -> ArtifactName {
        ArtifactName::new(s).unwrap()
    }

    fn stage(s: &str) -> StageName {
        StageName::new(s).unwrap()
    }

    #[test]
    fn encodes_each_action() {
        let rf = artifact("rf");
        let none: [&str; 0] = [];
        let cases = [
            (TagAction::Register("v1.2.3".into()), "rf@v1.2.3"),
            (TagAction::Deregister("v1.2.3".into()), "rf@v1.2.3!"),
            (TagAction::Assign(stage("prod")), "rf#prod"),
            (TagAction::Unassign(stage("prod")), "rf#prod!"),
            (TagAction::Deprecate, "rf@deprecated"),
        ];
        for (action, expected) in cases {
            let fields = encode(&rf, action, NamingMode::Simple, none);
            assert_eq!(fields.to_string(), expected);
        }
    }

    #[test]
    fn decodes_counter_suffix() {
        let fields = decode("team/model#production!#12").unwrap();
        assert_eq!(fields.artifact.as_str(), "team/model");
        assert_eq!(fields.action, TagAction::Unassign(stage("production")));
        assert_eq!(fields.counter, Some(12));

        let fields = decode("rf@v1.0.0-rc.1+b.7#2").unwrap();
        assert_eq!(fields.action, TagAction::Register("v1.0.0-rc.1+b.7".into()));
        assert_eq!(fields.counter, Some(2));
    }

    #[test]
    fn deprecated_is_not_a_version() {
        let fields = decode("nn@deprecated").unwrap();
        assert_eq!(fields.action, TagAction::Deprecate);
        assert_eq!(fields.action.version(), None);
    }

    #[test]
    fn rejects_foreign_names() {
        for name in [
            "v1.0.0",
            "release-2024",
            "rf",
            "rf@",
            "rf@1.2.3",
            "rf#",
            "rf#prod#0",
            "rf#prod#01",
            "rf#prod#x",
            "rf#Prod",
            "rf#1prod",
            "rf@v1!!",
            "rf@deprecated!",
            "Rf@v1",
            "-rf@v1",
            "rf@v1#2#3",
            "rf#prod#99999999999",
        ] {
            assert!(decode(name).is_none(), "decoded {name:?}");
        }
    }

    #[test]
    fn counted_mode_scans_existing_names() {
        let rf = artifact("rf");
        let existing = ["rf#prod", "rf#prod#3", "rf#prod!#7", "rf#staging#9", "nn#prod#11"];
        let fields = encode(&rf, TagAction::Assign(stage("prod")), NamingMode::Counted, existing);
        assert_eq!(fields.to_string(), "rf#prod#8");

        let fields = encode(&rf, TagAction::Unassign(stage("prod")), NamingMode::Counted, existing);
        assert_eq!(fields.to_string(), "rf#prod!#8");

        let fields = encode(&rf, TagAction::Assign(stage("staging")), NamingMode::Counted, existing);
        assert_eq!(fields.to_string(), "rf#staging#10");
    }

    #[test]
    fn counted_mode_starts_at_one() {
        let none: [&str; 0] = [];
        let fields = encode(
            &artifact("rf"),
            TagAction::Assign(stage("prod")),
            NamingMode::Counted,
            none,
        );
        assert_eq!(fields.to_string(), "rf#prod#1");
    }

    #[test]
    fn auto_mode_is_simple_until_taken() {
        let rf = artifact("rf");
        let register = TagAction::Register("v1.0.0".into());

        let none: [&str; 0] = [];
        let first = encode(&rf, register.clone(), NamingMode::Auto, none);
        assert_eq!(first.to_string(), "rf@v1.0.0");

        let second = encode(&rf, register, NamingMode::Auto, ["rf@v1.0.0", "rf@v1.0.0!"]);
        assert_eq!(second.to_string(), "rf@v1.0.0#1");

        let third = encode(&rf, TagAction::Register("v1.0.0".into()), NamingMode::Auto, ["rf@v1.0.0", "rf@v1.0.0#1"]);
        assert_eq!(third.to_string(), "rf@v1.0.0#2");
    }

    #[test]
    fn deregistration_continues_the_registration_counter() {
        let rf = artifact("rf");
        let deregister = TagAction::Deregister("v1.0.0".into());
        let fields = encode(&rf, deregister, NamingMode::Auto, ["rf@v1.0.0"]);
        assert_eq!(fields.to_string(), "rf@v1.0.0!#1");

        let fields = encode(
            &rf,
            TagAction::Register("v1.0.0".into()),
            NamingMode::Auto,
            ["rf@v1.0.0", "rf@v1.0.0!#1"],
        );
        assert_eq!(fields.to_string(), "rf@v1.0.0#2");
    }

    #[test]
    fn same_prefix_ignores_counter() {
        let fields = decode("rf#prod#5").unwrap();
        assert!(fields.same_prefix(&artifact("rf"), &TagAction::Assign(stage("prod"))));
        assert!(fields.same_prefix(&artifact("rf"), &TagAction::Unassign(stage("prod"))));
        assert!(!fields.same_prefix(&artifact("rf"), &TagAction::Assign(stage("staging"))));
        assert!(!fields.same_prefix(&artifact("nn"), &TagAction::Assign(stage("prod"))));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn name_strategy() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9/-]{0,12}[a-z0-9]"
        }

        fn action_strategy() -> impl Strategy<Value = TagAction> {
            let version = (0u64..50, 0u64..50, 0u64..50, proptest::option::of("[a-z]{1,5}"))
                .prop_map(|(a, b, c, pre)| match pre {
                    Some(pre) => format!("v{a}.{b}.{c}-{pre}.1"),
                    None => format!("v{a}.{b}.{c}"),
                });
            prop_oneof![
                version.clone().prop_map(TagAction::Register),
                version.prop_map(TagAction::Deregister),
                name_strategy().prop_map(|s| TagAction::Assign(StageName::new(s).unwrap())),
                name_strategy().prop_map(|s| TagAction::Unassign(StageName::new(s).unwrap())),
                Just(TagAction::Deprecate),
            ]
        }

        proptest! {
            #[test]
            fn decode_inverts_encode(
                name in name_strategy(),
                action in action_strategy(),
                counter in proptest::option::of(1u32..10_000),
            ) {
                let fields = TagFields::new(ArtifactName::new(name).unwrap(), action, counter);
                let decoded = decode(&fields.to_string());
                prop_assert_eq!(decoded, Some(fields));
            }
        }
    }
}
