use proptest::prelude::*;
use specmock_core::{NumberPattern, ObjectPattern, Pattern, Resolver, Row, StringPattern};

fn leaf() -> impl Strategy<Value = Pattern> {
    prop_oneof![
        Just(Pattern::Null),
        Just(Pattern::Boolean),
        Just(Pattern::number()),
        Just(Pattern::integer()),
        (0.0f64..100.0, 1.0f64..50.0).prop_map(|(min, span)| {
            Pattern::Number(NumberPattern::between(min.floor(), (min + span).floor()))
        }),
        Just(Pattern::string()),
        (0usize..5, 5usize..12).prop_map(|(min, max)| {
            Pattern::String(StringPattern {
                min_length: Some(min),
                max_length: Some(max),
            })
        }),
        Just(Pattern::Date),
        Just(Pattern::DateTime),
        Just(Pattern::Uuid),
        Just(Pattern::Email),
        "[a-z]{1,8}".prop_map(Pattern::exact),
        any::<i32>().prop_map(Pattern::exact),
    ]
}

fn pattern() -> impl Strategy<Value = Pattern> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(Pattern::list_of),
            inner.clone().prop_map(Pattern::nullable),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Pattern::AnyOf),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Pattern::Tuple),
            prop::collection::vec(("[a-z]{1,6}", inner, any::<bool>()), 0..4).prop_map(|fields| {
                let mut object = ObjectPattern::new();
                for (key, pattern, optional) in fields {
                    object = if optional {
                        object.optional(key, pattern)
                    } else {
                        object.required(key, pattern)
                    };
                }
                Pattern::object(object)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn proptest_generated_values_match(pattern in pattern()) {
        let resolver = Resolver::new();
        let value = pattern.generate(&resolver).unwrap();
        let result = pattern.matches(&value, &resolver).unwrap();
        prop_assert!(result.is_success(), "{} rejected {}: {}", pattern, value, result.report());
    }

    #[test]
    fn proptest_encompasses_is_reflexive(pattern in pattern()) {
        let v1 = Resolver::with_patterns([("Node".to_string(), pattern.clone())]);
        let v2 = Resolver::with_patterns([("Node".to_string(), pattern.clone())]);
        let reference = Pattern::reference("Node");
        prop_assert!(pattern.encompasses(&pattern, &v1, &v2).unwrap().is_success());
        prop_assert!(reference.encompasses(&reference, &v1, &v2).unwrap().is_success());
    }

    #[test]
    fn proptest_negatives_are_rejected(pattern in pattern()) {
        let resolver = Resolver::new();
        for negative in pattern.negative_specialize(&Row::new(), &resolver) {
            let negative = negative.unwrap();
            let value = negative.generate(&resolver).unwrap();
            let result = pattern.matches(&value, &resolver).unwrap();
            prop_assert!(result.is_failure(), "{} accepted negative {}", pattern, value);
        }
    }

    #[test]
    fn proptest_row_free_specialization_still_matches(pattern in pattern()) {
        let resolver = Resolver::new();
        let value = pattern.generate(&resolver).unwrap();
        let first = pattern.specialize_from_row(&Row::new(), &resolver).next();
        if let Some(specialized) = first {
            let specialized = specialized.unwrap();
            prop_assert!(pattern.encompasses(&specialized, &resolver, &resolver).unwrap().is_success());
        }
        prop_assert!(pattern.matches(&value, &resolver).unwrap().is_success());
    }
}

#[test]
fn test_recursive_schema_validates_and_self_encompasses() {
    let data = Pattern::from_template(&serde_json::json!({
        "id": "(number)",
        "children": "(Data*)"
    }))
    .unwrap();
    let resolver = Resolver::with_patterns([("Data".to_string(), data)]);
    let value = specmock_core::Value::from(serde_json::json!({
        "id": 1,
        "children": [
            {"id": 2, "children": []},
            {"id": 3, "children": [{"id": 4, "children": []}]}
        ]
    }));
    let reference = Pattern::reference("Data");
    assert!(reference.matches(&value, &resolver).unwrap().is_success());
    assert!(reference
        .encompasses(&reference, &resolver, &resolver)
        .unwrap()
        .is_success());
}

#[test]
fn test_aggregated_list_failures_carry_indices() {
    let resolver = Resolver::new();
    let value = specmock_core::Value::from(serde_json::json!(["elementA", 2, "elementC"]));
    let result = Pattern::list_of(Pattern::number())
        .matches(&value, &resolver)
        .unwrap();
    let breadcrumbs: Vec<String> = result.entries().into_iter().map(|e| e.breadcrumb).collect();
    assert_eq!(breadcrumbs, vec!["[0]", "[2]"]);
}
