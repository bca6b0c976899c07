use std::thread;

use indoc::indoc;
use rstest::rstest;
use stackable_cluster_spec::{
    ClusterKind, ClusterResource, Codec, FieldPath, FieldValue, SchemaRegistry, SetError,
    SpecNode, ValidationError, Validator, ValueKind,
    builder::{ClusterSpecBuilder, NodeBuilder, VolumeBuilder},
};

fn registry() -> &'static SchemaRegistry {
    SchemaRegistry::embedded()
}

fn codec() -> Codec<'static> {
    Codec::new(registry())
}

fn encode(node: &SpecNode) -> String {
    String::from_utf8(codec().encode(node).expect("encodable")).expect("UTF-8")
}

#[rstest]
#[case::volume(
    "Volume",
    r#"{"configMap":{"items":[{"key":"a","path":"b","mode":420}],"name":"logging","futureSetting":{"x":1}},"name":"config","annotations":["kept"]}"#
)]
#[case::pod_security_context(
    "PodSecurityContext",
    r#"{"fsGroup":1000,"seLinuxOptions":{"level":"s0"},"supplementalGroups":[1,2],"sysctls":[{"name":"a","value":"b"}]}"#
)]
#[case::ray_cluster_spec(
    "RayClusterSpec",
    r#"{"istioMutualTLSMode":"STRICT","image":{"repository":"rayproject/ray","tag":"1.6.0-cpu"},"redisShardPorts":[6380,6381],"worker":{"resources":{"requests":{"cpu":1,"memory":"1Gi"}},"replicas":2},"unreleasedFeature":null}"#
)]
fn encode_decode_round_trip(#[case] kind: &str, #[case] json: &str) {
    let node = codec().decode(json.as_bytes(), kind).expect("valid document");

    let encoded = encode(&node);
    let decoded = codec().decode(encoded.as_bytes(), kind).expect("re-decodable");
    assert_eq!(decoded, node);

    // encode(decode(encode(n))) == encode(n)
    assert_eq!(encode(&decoded), encoded);
}

#[test]
fn canonical_encoding_orders_known_fields() {
    let node = codec()
        .decode(br#"{"name":"data","futureField":true,"hostPath":{"path":"/data"}}"#, "Volume")
        .expect("valid document");

    assert_eq!(
        encode(&node),
        r#"{"hostPath":{"path":"/data"},"name":"data","futureField":true}"#
    );
}

#[test]
fn missing_required_fields_are_all_reported() {
    let spec = codec()
        .decode(
            indoc! {br#"
                {
                  "worker": {
                    "initContainers": [{"image": "busybox"}],
                    "volumes": [{"configMap": {"name": "config"}}]
                  }
                }
            "#},
            "DaskClusterSpec",
        )
        .expect("valid document");

    let errors = Validator::new(registry()).validate(&spec);

    assert_eq!(errors, vec![
        ValidationError::MissingRequiredField {
            path: FieldPath::from_iter(["worker", "initContainers"]).index(0).child("name"),
            kind: "Container".to_owned(),
            field: "name".to_owned(),
        },
        ValidationError::MissingRequiredField {
            path: FieldPath::from_iter(["worker", "volumes"]).index(0).child("name"),
            kind: "Volume".to_owned(),
            field: "name".to_owned(),
        },
    ]);
}

#[test]
fn one_of_members_are_exclusive() {
    let volume = codec()
        .decode(
            br#"{"name":"v","configMap":{"name":"a"},"secret":{"secretName":"b"}}"#,
            "Volume",
        )
        .expect("valid document");

    assert_eq!(Validator::new(registry()).validate(&volume), vec![
        ValidationError::ConflictingOneOf {
            path: FieldPath::new(),
            kind: "Volume".to_owned(),
            group: "source".to_owned(),
            members: vec!["config_map".to_owned(), "secret".to_owned()],
        }
    ]);
}

#[test]
fn required_one_of_group_must_be_set() {
    let mut builder = NodeBuilder::new(registry(), "Volume").expect("declared kind");
    builder.set("name", "empty").expect("valid value");

    let errors = Validator::new(registry()).validate(&builder.build());
    assert!(matches!(
        errors.as_slice(),
        [ValidationError::MissingOneOf { group, members, .. }] if group == "source" && members.len() == 10
    ));
}

#[test]
fn unknown_fields_are_preserved() {
    let node = codec()
        .decode(br#"{"path":"/x","futureField":42}"#, "HostPathVolumeSource")
        .expect("valid document");

    assert_eq!(node.unknown_fields().get("futureField"), Some(&serde_json::json!(42)));
    assert_eq!(encode(&node), r#"{"path":"/x","futureField":42}"#);
}

#[test]
fn strict_codec_rejects_unknown_fields() {
    let error = codec()
        .strict(true)
        .decode(br#"{"path":"/x","futureField":42}"#, "HostPathVolumeSource")
        .expect_err("unknown field");

    assert_eq!(error.path().to_string(), "futureField");
}

#[test]
fn absent_null_and_empty_lists_are_distinct() {
    let mut builder = NodeBuilder::new(registry(), "ConfigMapVolumeSource").expect("declared kind");
    assert_eq!(encode(&builder.build()), "{}");

    builder.set("items", Vec::<FieldValue>::new()).expect("valid value");
    assert_eq!(encode(&builder.build()), r#"{"items":[]}"#);

    builder.set_null("items").expect("nullable field");
    assert_eq!(encode(&builder.build()), r#"{"items":null}"#);

    builder.unset("items").expect("declared field");
    assert_eq!(encode(&builder.build()), "{}");
}

#[test]
fn builder_fails_fast() {
    let mut builder = NodeBuilder::new(registry(), "PodSecurityContext").expect("declared kind");

    assert_eq!(
        builder.set("run_as_user", "not-a-number").map(|_| ()),
        Err(SetError::TypeMismatch {
            kind: "PodSecurityContext".to_owned(),
            field: "run_as_user".to_owned(),
            expected: ValueKind::Int,
            found: "string".to_owned(),
        })
    );
    assert!(!builder.build().is_set("run_as_user"));
}

#[test]
fn registry_is_shared_between_threads() {
    let registry = registry();

    thread::scope(|scope| {
        for index in 0..4 {
            scope.spawn(move || {
                let mut volume = VolumeBuilder::new_in(registry, format!("volume-{index}")).expect("valid name");
                volume.with_empty_dir(None::<String>, Some("1Gi")).expect("valid values");
                assert_eq!(Validator::new(registry).validate(&volume.build()), vec![]);
            });
        }
    });
}

#[test]
fn cluster_resource_lifecycle() {
    let mut builder = ClusterSpecBuilder::new(ClusterKind::RayCluster).expect("declared kind");
    builder
        .worker_resources(
            [("cpu".to_owned(), "500m".to_owned()), ("memory".to_owned(), "1Gi".to_owned())].into(),
            [("memory".to_owned(), "1Gi".to_owned())].into(),
        )
        .and_then(|b| b.set("worker_ports", vec![12000, 12001]))
        .expect("valid values");

    let mut resource =
        ClusterResource::new(ClusterKind::RayCluster, "ray", Some("compute"), builder.build()).expect("valid resource");
    resource.apply_defaults(registry()).expect("defaults apply");
    assert_eq!(resource.validate(registry()), vec![]);

    let body = resource.to_request_body(&codec()).expect("encodable");
    let decoded = ClusterResource::from_response_body(&body, &codec()).expect("decodable");
    assert_eq!(decoded, resource);
    assert_eq!(decoded.spec().get_int("port"), Some(6379));
}

#[test]
fn cluster_rules_report_every_problem() {
    let spec = codec()
        .decode(
            indoc! {br#"
                {
                  "istioMutualTLSMode": "MUTUAL",
                  "image": {"repository": "rayproject/ray"},
                  "kerberosKeytab": {"contents": "a2V5dGFi", "mountPath": "/etc/krb5.keytab"},
                  "port": 6379,
                  "clientServerPort": 6379,
                  "dashboardPort": 99999,
                  "objectStoreMemoryBytes": 0,
                  "worker": {"replicas": -2, "resources": {"requests": {"memory": "1Gi"}}}
                }
            "#},
            "RayClusterSpec",
        )
        .expect("valid document");

    let errors = ClusterKind::RayCluster
        .validate(&spec)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    assert_eq!(errors, vec![
        r#"spec.istioMutualTLSMode: Invalid value: "MUTUAL": mode must be one of the following: [UNSET DISABLE PERMISSIVE STRICT]"#,
        "spec.image.tag: Required value: cannot be blank",
        "spec.worker.replicas: Invalid value: -2: should be greater than or equal to 0",
        "spec.worker.resources.requests.cpu: Required value: is mandatory",
        "spec.objectStoreMemoryBytes: Invalid value: 0: should be greater than or equal to 78643200",
        "spec.clientServerPort: Duplicate value: 6379",
        "spec.dashboardPort: Invalid value: 99999: must be less than or equal to 65535",
    ]);
}
