mod common;

use dynamo_mapper::{
    record, unmarshal, unmarshal_append, unmarshal_item, AttributeValue, Error, Item,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

fn s(v: &str) -> AttributeValue {
    AttributeValue::S(v.to_string())
}

fn n(v: &str) -> AttributeValue {
    AttributeValue::N(v.to_string())
}

fn item<const N: usize>(entries: [(&str, AttributeValue); N]) -> Item {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

record! {
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Embedded {
        #[tag = r#"dynamo:"Embedded""#]
        pub embedded: bool,
    }
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct UnexportedEmbed {
        #[embed]
        inner: Option<Embedded>,
        #[tag = r#"dynamo:"Other""#]
        pub other: bool,
    }
}

#[test]
fn unexported_embedded_pointer_is_ignored() {
    common::init_tracing();

    let mut out = UnexportedEmbed::default();
    unmarshal_item(
        &item([("Embedded", AttributeValue::Bool(true)), ("Other", AttributeValue::Bool(true))]),
        &mut out,
    )
    .unwrap();

    assert_eq!(
        out,
        UnexportedEmbed {
            inner: None,
            other: true,
        }
    );
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct WithPrivate {
        #[tag = r#"dynamo:"Private""#]
        private: String,
        #[tag = r#"dynamo:"Public""#]
        pub public: i64,
    }
}

#[test]
fn unexported_fields_are_ignored() {
    let mut out = WithPrivate {
        private: "keep".into(),
        public: 0,
    };
    unmarshal_item(&item([("Private", s("lost")), ("Public", n("555"))]), &mut out).unwrap();

    assert_eq!(
        out,
        WithPrivate {
            private: "keep".into(),
            public: 555,
        }
    );
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct ExportedEmbed {
        #[embed]
        pub embedded: Option<Embedded>,
        #[tag = r#"dynamo:"Embedded""#]
        pub shadow: String,
    }
}

#[test]
fn explicit_field_claims_key_over_embedded_pointer() {
    let mut out = ExportedEmbed::default();
    unmarshal_item(&item([("Embedded", s("OK"))]), &mut out).unwrap();

    // the pointer is allocated because a key matched, but stays empty
    assert_eq!(
        out,
        ExportedEmbed {
            embedded: Some(Embedded::default()),
            shadow: "OK".into(),
        }
    );
}

#[test]
fn embedded_pointer_left_alone_without_matching_keys() {
    let mut out = ExportedEmbed::default();
    unmarshal_item(&item([("Unrelated", n("1"))]), &mut out).unwrap();
    assert_eq!(out.embedded, None);
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct Named {
        #[tag = r#"dynamo:"Name""#]
        pub name: String,
        #[tag = r#"dynamo:"Nickname""#]
        pub nickname: String,
    }
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct Person {
        #[embed]
        pub named: Named,
        #[tag = r#"dynamo:"Name""#]
        pub name: String,
    }
}

#[test]
fn explicit_fields_win_when_decoding() {
    let mut out = Person::default();
    unmarshal_item(&item([("Name", s("Ada")), ("Nickname", s("A"))]), &mut out).unwrap();

    assert_eq!(
        out,
        Person {
            named: Named {
                name: String::new(),
                nickname: "A".into(),
            },
            name: "Ada".into(),
        }
    );
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct Hit {
        #[tag = r#"dynamo:"UserID""#]
        pub user: i64,
        #[tag = r#"dynamo:"Page""#]
        pub page: i64,
        #[tag = r#"dynamo:"Limit""#]
        pub limit: u32,
        #[tag = r#"dynamo:"Null""#]
        pub null: serde_json::Value,
    }
}

#[test]
fn append_many_items() {
    let hit = item([
        ("UserID", n("555")),
        ("Page", n("5")),
        ("Limit", n("10")),
        ("Null", AttributeValue::Null),
    ]);

    let mut hits: Vec<Hit> = Vec::new();
    for _ in 0..15 {
        unmarshal_append(&hit, &mut hits).unwrap();
    }

    assert_eq!(hits.len(), 15);
    for h in &hits {
        assert_eq!(
            h,
            &Hit {
                user: 555,
                page: 5,
                limit: 10,
                null: serde_json::Value::Null,
            }
        );
    }
}

#[test]
fn append_stops_on_bad_item() {
    let mut hits: Vec<Hit> = Vec::new();
    let err = unmarshal_append(&item([("Limit", n("-1"))]), &mut hits).unwrap_err();

    assert!(matches!(err, Error::InvalidNumber { target: "u32", .. }));
    assert!(hits.is_empty());
}

#[test]
fn append_into_maps() {
    let mut rows: Vec<HashMap<String, i64>> = Vec::new();
    unmarshal_append(&item([("a", n("1"))]), &mut rows).unwrap();
    unmarshal_append(&item([("b", n("2"))]), &mut rows).unwrap();

    assert_eq!(
        rows,
        vec![
            HashMap::from([("a".to_string(), 1)]),
            HashMap::from([("b".to_string(), 2)]),
        ]
    );
}

#[test]
fn null_resets_a_record() {
    let mut out = Hit {
        user: 1,
        page: 2,
        limit: 3,
        null: serde_json::json!("x"),
    };
    unmarshal(&AttributeValue::Null, &mut out).unwrap();
    assert_eq!(out, Hit::default());
}

#[test]
fn missing_keys_keep_previous_values() {
    let mut out = Hit {
        user: 1,
        page: 2,
        ..Hit::default()
    };
    unmarshal_item(&item([("Page", n("9"))]), &mut out).unwrap();

    assert_eq!(out.user, 1);
    assert_eq!(out.page, 9);
}

#[test]
fn record_rejects_non_map() {
    let mut out = Hit::default();
    let err = unmarshal(&s("nope"), &mut out).unwrap_err();
    assert_eq!(err.to_string(), "dynamo unmarshal: cannot decode S into struct");
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct Secret {
        #[tag = r#"dynamo:"Public""#]
        pub public: i64,
        private: String,
        #[tag = r#"dynamo:"-""#]
        pub skipped: String,
    }
}

#[test]
fn null_leaves_hidden_fields_alone() {
    let mut out = Secret {
        public: 1,
        private: "keep".into(),
        skipped: "keep".into(),
    };
    unmarshal(&AttributeValue::Null, &mut out).unwrap();

    assert_eq!(
        out,
        Secret {
            public: 0,
            private: "keep".into(),
            skipped: "keep".into(),
        }
    );
}

record! {
    #[derive(Debug, Default, PartialEq)]
    struct Node {
        #[tag = r#"dynamo:"Name""#]
        pub name: String,
        #[embed]
        pub parent: Option<Box<Node>>,
    }
}

#[test]
fn self_embedding_pointer_decodes() {
    use dynamo_mapper::Unmarshal;

    assert_eq!(Node::default().embedded_names(), vec!["Name"]);

    let mut out = Node::default();
    unmarshal_item(&item([("Name", s("leaf"))]), &mut out).unwrap();

    assert_eq!(
        out,
        Node {
            name: "leaf".into(),
            parent: Some(Box::default()),
        }
    );
}
