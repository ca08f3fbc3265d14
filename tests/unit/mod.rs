// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for pod-mutator.
//!
//! These tests run without a Kubernetes cluster and exercise the public API
//! of each component in isolation.

#[path = "../common/mod.rs"]
mod common;

mod patch_tests {
    use jsonptr::PointerBuf;
    use pod_mutator::patch::{ArrayField, Op, PatchBase, PatchIndex, PatchOp, to_json_patch};
    use serde_json::json;

    fn ptr(s: &str) -> PointerBuf {
        PointerBuf::parse(s).unwrap()
    }

    #[test]
    fn test_op_display() {
        assert_eq!(Op::Add.to_string(), "add");
        assert_eq!(Op::Remove.to_string(), "remove");
        assert_eq!(Op::Replace.to_string(), "replace");
        assert!("move".parse::<Op>().is_err());
    }

    #[test]
    fn test_index_display() {
        assert_eq!(PatchIndex::Append.to_string(), "-");
        assert_eq!(PatchIndex::At(2).to_string(), "2");
        assert!(" 3 ".parse::<PatchIndex>().is_err());
        assert!(" add".parse::<Op>().is_err());
        assert_eq!("".parse::<PatchIndex>().unwrap(), PatchIndex::Append);
        assert_eq!("-".parse::<PatchIndex>().unwrap(), PatchIndex::Append);
        assert_eq!("7".parse::<PatchIndex>().unwrap(), PatchIndex::At(7));
    }

    #[test]
    fn test_patch_op_wire_format() {
        let ops = vec![
            PatchOp::add(ptr("/metadata/labels/injected"), json!("true")),
            PatchOp::remove(ptr("/spec/containers/1")),
            PatchOp::replace(ptr("/spec/priority"), json!(10)),
        ];
        assert_eq!(
            serde_json::to_value(&ops).unwrap(),
            json!([
                {"op": "add", "path": "/metadata/labels/injected", "value": "true"},
                {"op": "remove", "path": "/spec/containers/1"},
                {"op": "replace", "path": "/spec/priority", "value": 10}
            ])
        );
    }

    #[test]
    fn test_json_patch_conversion_keeps_order() {
        let ops = vec![
            PatchOp::add(ptr("/spec/volumes"), json!([])),
            PatchOp::add(ptr("/spec/volumes/-"), json!({"name": "shared"})),
        ];
        let patch = to_json_patch(ops.clone());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::to_value(&ops).unwrap()
        );
    }

    #[test]
    fn test_json_patch_applies_to_pod() {
        let mut pod = json!({"spec": {"containers": [{"name": "app"}]}});
        let patch = to_json_patch(vec![
            PatchOp::add(ptr("/spec/initContainers"), json!([])),
            PatchOp::add(ptr("/spec/initContainers/-"), json!({"name": "setup"})),
            PatchOp::add(ptr("/spec/containers/0"), json!({"name": "proxy"})),
        ]);
        json_patch::patch(&mut pod, &patch).unwrap();
        assert_eq!(
            pod,
            json!({"spec": {
                "containers": [{"name": "proxy"}, {"name": "app"}],
                "initContainers": [{"name": "setup"}]
            }})
        );
    }

    #[test]
    fn test_patch_base_expansion() {
        let base = PatchBase::new(Op::Replace, PatchIndex::At(1));
        let op = base.expand(ArrayField::Volumes, &json!({"name": "data"})).unwrap();
        assert_eq!(op.path.as_str(), "/spec/volumes/1");
        assert_eq!(op.value, Some(json!({"name": "data"})));

        let op = PatchBase::default()
            .expand(ArrayField::InitContainers, &json!({"name": "x"}))
            .unwrap();
        assert_eq!(op.op, Op::Add);
        assert_eq!(op.path.as_str(), "/spec/initContainers/-");
    }

    #[test]
    fn test_array_field_paths() {
        assert_eq!(ArrayField::Containers.array_path().as_str(), "/spec/containers");
        assert_eq!(ArrayField::InitContainers.element_prefix(), "/spec/initContainers/");
        assert_eq!(
            ArrayField::GUARD_ORDER,
            [
                ArrayField::InitContainers,
                ArrayField::Containers,
                ArrayField::Volumes
            ]
        );
    }
}

mod config_tests {
    use pod_mutator::config::{ConfigSet, MutateConfig};
    use pod_mutator::patch::Op;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_config_compiles_to_nothing() {
        assert!(MutateConfig::default().patch_ops().unwrap().is_empty());
        assert!(ConfigSet::default().patch_ops().unwrap().is_empty());
    }

    #[test]
    fn test_full_yaml_entry() {
        let config = MutateConfig::from_entry(
            "mesh",
            r#"
patch:
  - op: add
    path: /metadata/labels/injected
    value: "true"
containers:
  - name: proxy
    image: envoyproxy/envoy:v1.30
    index: 0
initContainers:
  - name: setup
    image: busybox
volumes:
  - op: remove
    index: "2"
    name: scratch
"#,
        )
        .unwrap();

        assert_eq!(config.name, "mesh");
        let ops = serde_json::to_value(config.patch_ops().unwrap()).unwrap();
        assert_eq!(
            ops,
            json!([
                {"op": "add", "path": "/spec/containers/0",
                 "value": {"name": "proxy", "image": "envoyproxy/envoy:v1.30"}},
                {"op": "add", "path": "/spec/initContainers/-",
                 "value": {"name": "setup", "image": "busybox"}},
                {"op": "remove", "path": "/spec/volumes/2"},
                {"op": "add", "path": "/metadata/labels/injected", "value": "true"}
            ])
        );
    }

    #[test]
    fn test_json_entry_accepted() {
        let config = MutateConfig::from_entry(
            "raw",
            r#"{"patch": [{"op": "replace", "path": "/spec/priority", "value": 5}]}"#,
        )
        .unwrap();
        let ops = config.patch_ops().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, Op::Replace);
    }

    #[test]
    fn test_config_set_skips_bad_entries() {
        let entries = BTreeMap::from([
            ("a-good".to_string(), "volumes: [{name: cache}]".to_string()),
            ("b-bad".to_string(), "patch: {not: a list}".to_string()),
            ("c-bad-index".to_string(), "containers: [{name: x, index: first}]".to_string()),
        ]);

        let (set, skipped) = ConfigSet::from_entries(&entries);

        assert_eq!(set.names(), vec!["a-good"]);
        let keys: Vec<_> = skipped.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["b-bad", "c-bad-index"]);
    }
}

mod guard_tests {
    use crate::common::fixtures::PodBuilder;
    use jsonptr::PointerBuf;
    use pod_mutator::patch::{PatchOp, guard_missing_arrays};
    use serde_json::json;

    fn add(path: &str) -> PatchOp {
        PatchOp::add(PointerBuf::parse(path).unwrap(), json!({"name": "x"}))
    }

    #[test]
    fn test_guard_prepends_for_missing_volumes() {
        let pod = PodBuilder::new("web").build_json();
        let mut ops = vec![add("/spec/volumes/-")];

        guard_missing_arrays(&mut ops, &pod);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].path.as_str(), "/spec/volumes");
        assert_eq!(ops[0].value, Some(json!([])));
    }

    #[test]
    fn test_guard_leaves_existing_arrays() {
        let pod = PodBuilder::new("web")
            .init_container("setup", "busybox")
            .volume("data")
            .build_json();
        let mut ops = vec![
            add("/spec/initContainers/-"),
            add("/spec/containers/0"),
            add("/spec/volumes/-"),
        ];
        let before = ops.clone();

        guard_missing_arrays(&mut ops, &pod);

        assert_eq!(ops, before);
    }
}

mod webhook_tests {
    use crate::common::fixtures::PodBuilder;
    use pod_mutator::webhooks::{
        AdmissionDecoder, CONFIG_ANNOTATION, DecodeError, MutationDecision, WebhookError,
        mutation_decision,
    };

    #[test]
    fn test_mutation_decision() {
        let plain = PodBuilder::new("web").build();
        assert_eq!(
            mutation_decision(&plain, CONFIG_ANNOTATION),
            MutationDecision::Passthrough
        );

        let annotated = PodBuilder::new("web").config("sidecars").build();
        assert_eq!(
            mutation_decision(&annotated, CONFIG_ANNOTATION),
            MutationDecision::Resolve("sidecars".to_string())
        );
    }

    #[test]
    fn test_decode_error_is_not_transport() {
        let err = WebhookError::from(DecodeError::EmptyBody);
        assert!(!err.is_transport());
        assert!(WebhookError::PatchSerialization("boom".to_string()).is_transport());
    }

    #[test]
    fn test_custom_content_type() {
        use axum::http::{HeaderMap, HeaderValue, header::CONTENT_TYPE};

        let decoder = AdmissionDecoder::new("application/vnd.admission+json");
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let err = decoder.decode_request(&headers, b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::ContentType(_)));
    }
}

mod health_tests {
    use pod_mutator::health::{AdmissionOutcome, HealthState};

    #[tokio::test]
    async fn test_health_state_starts_not_ready() {
        let state = HealthState::new();
        assert!(!state.is_ready().await);
        state.set_ready(true).await;
        assert!(state.is_ready().await);
    }

    #[test]
    fn test_outcome_counters() {
        let state = HealthState::new();
        state.metrics.record_admission(AdmissionOutcome::Mutated);
        state.metrics.record_admission(AdmissionOutcome::Mutated);
        state.metrics.record_admission(AdmissionOutcome::Denied);

        assert_eq!(state.metrics.admissions(AdmissionOutcome::Mutated), 2);
        assert_eq!(state.metrics.admissions(AdmissionOutcome::Denied), 1);
        assert_eq!(state.metrics.admissions(AdmissionOutcome::Passthrough), 0);
    }

    #[test]
    fn test_error_outcome_has_own_label() {
        let state = HealthState::new();
        state.metrics.record_admission(AdmissionOutcome::Error);

        assert_eq!(state.metrics.admissions(AdmissionOutcome::Error), 1);
        assert_eq!(state.metrics.admissions(AdmissionOutcome::Denied), 0);
        assert!(state.metrics.encode().contains("outcome=\"error\""));
    }
}
