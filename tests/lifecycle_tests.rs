//! Integration tests for the instance lifecycle controller, run against
//! both ownership registry strategies.

mod support;

use podbench::domain::{InstanceState, OwnerId};
use podbench::error::Error;
use podbench::registry::OwnershipRegistry;
use support::{system, Strategy};

const U1: &str = "auth0|u1";
const U2: &str = "auth0|u2";

const STRATEGIES: [Strategy; 2] = [Strategy::Labels, Strategy::Durable];

#[tokio::test]
async fn create_list_delete_flow() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);

        let instance = sys
            .lifecycle
            .create_instance(&owner, "hail", "nb1")
            .await
            .unwrap();
        assert!(!instance.instance_id.as_str().is_empty());
        assert_eq!(instance.display_name, "nb1");
        assert_eq!(instance.state, InstanceState::Provisioning);
        assert_eq!(instance.image_ref, "gcr.io/hail-vdc/hail:0.2.11");
        assert!(instance.endpoint_ref.is_some());

        let listed = sys.lifecycle.list_instances(&owner).await.unwrap();
        assert_eq!(listed.len(), 1, "{strategy:?}");
        assert_eq!(listed[0].instance_id, instance.instance_id);

        // Never visible to another owner.
        let other = sys
            .lifecycle
            .list_instances(&OwnerId::new(U2))
            .await
            .unwrap();
        assert!(other.is_empty(), "{strategy:?}");

        sys.lifecycle
            .delete_instance(&owner, &instance.instance_id)
            .await
            .unwrap();
        assert!(sys.lifecycle.list_instances(&owner).await.unwrap().is_empty());
        assert_eq!(sys.cluster.compute_count(), 0);
        assert_eq!(sys.cluster.endpoint_count(), 0);
    }
}

#[tokio::test]
async fn invalid_image_has_zero_side_effects() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);

        let err = sys
            .lifecycle
            .create_instance(&owner, "not-a-real-image", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)), "{strategy:?}");

        assert_eq!(sys.cluster.compute_count(), 0);
        assert_eq!(sys.cluster.endpoint_count(), 0);
        assert!(sys.lifecycle.list_instances(&owner).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn deleting_a_foreign_instance_is_forbidden_without_side_effects() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);
        let intruder = OwnerId::new(U2);

        let instance = sys
            .lifecycle
            .create_instance(&owner, "hail", "nb1")
            .await
            .unwrap();

        let err = sys
            .lifecycle
            .delete_instance(&intruder, &instance.instance_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden), "{strategy:?}");

        assert_eq!(sys.cluster.compute_count(), 1);
        assert_eq!(sys.lifecycle.list_instances(&owner).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn delete_is_idempotent() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);

        let instance = sys
            .lifecycle
            .create_instance(&owner, "hail", "nb1")
            .await
            .unwrap();

        sys.lifecycle
            .delete_instance(&owner, &instance.instance_id)
            .await
            .unwrap();
        sys.lifecycle
            .delete_instance(&owner, &instance.instance_id)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn durable_registry_keeps_deleted_state() {
    let sys = system(Strategy::Durable, true);
    let owner = OwnerId::new(U1);

    let instance = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();
    sys.lifecycle
        .delete_instance(&owner, &instance.instance_id)
        .await
        .unwrap();

    let record = sys.registry.find_instance(&instance.instance_id).await.unwrap();
    assert_eq!(record.state, InstanceState::Deleted);
}

#[tokio::test]
async fn concurrent_creates_get_distinct_identities() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);

        let (a, b) = tokio::join!(
            sys.lifecycle.create_instance(&owner, "hail", "nb1"),
            sys.lifecycle.create_instance(&owner, "hail", "nb1"),
        );
        let a = a.unwrap();
        let b = b.unwrap();

        assert_ne!(a.instance_id, b.instance_id, "{strategy:?}");
        assert_ne!(a.access_token.as_str(), b.access_token.as_str());
        assert_eq!(sys.lifecycle.list_instances(&owner).await.unwrap().len(), 2);
    }
}

#[tokio::test]
async fn partial_teardown_failure_still_deletes_logically() {
    let sys = system(Strategy::Durable, true);
    let owner = OwnerId::new(U1);

    let instance = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();

    sys.cluster.fail_next_delete_compute();
    sys.lifecycle
        .delete_instance(&owner, &instance.instance_id)
        .await
        .unwrap();

    // The compute resource survived the failed delete, but the caller
    // still observes successful logical deletion.
    assert_eq!(sys.cluster.compute_count(), 1);
    assert!(sys.lifecycle.list_instances(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn endpoint_name_is_injected_into_compute_startup() {
    let sys = system(Strategy::Labels, true);
    let owner = OwnerId::new(U1);

    let instance = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();
    let endpoint = instance.endpoint_ref.clone().unwrap();

    let spec = sys.cluster.compute_spec(&instance.compute_ref).unwrap();
    let base_url_arg = format!("--NotebookApp.base_url=/instance/{endpoint}/");
    assert!(spec.command.contains(&base_url_arg), "{:?}", spec.command);
    assert_eq!(spec.readiness_path, format!("/instance/{endpoint}/login"));

    // The endpoint routes to this instance's compute unit.
    let endpoint_spec = sys.cluster.endpoint_spec(&endpoint).unwrap();
    assert_eq!(
        endpoint_spec.selector.get("podbench.io/instance").map(String::as_str),
        Some(instance.instance_id.as_str())
    );
}

#[tokio::test]
async fn endpointless_variant_derives_base_url_from_instance_id() {
    let sys = system(Strategy::Labels, false);
    let owner = OwnerId::new(U1);

    let instance = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();
    assert!(instance.endpoint_ref.is_none());
    assert_eq!(sys.cluster.endpoint_count(), 0);

    let spec = sys.cluster.compute_spec(&instance.compute_ref).unwrap();
    let base_url_arg = format!(
        "--NotebookApp.base_url=/instance/{}/",
        instance.instance_id
    );
    assert!(spec.command.contains(&base_url_arg));
}

#[tokio::test]
async fn failed_compute_creation_cleans_up_the_endpoint() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);

        sys.cluster.fail_next_create_compute();
        let err = sys
            .lifecycle
            .create_instance(&owner, "hail", "nb1")
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{strategy:?}");

        assert_eq!(sys.cluster.compute_count(), 0);
        assert_eq!(sys.cluster.endpoint_count(), 0);
        assert!(sys.lifecycle.list_instances(&owner).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn verify_ownership_gates_on_true_owner() {
    for strategy in STRATEGIES {
        let sys = system(strategy, true);
        let owner = OwnerId::new(U1);
        let intruder = OwnerId::new(U2);

        let instance = sys
            .lifecycle
            .create_instance(&owner, "hail", "nb1")
            .await
            .unwrap();

        sys.lifecycle
            .verify_ownership(&owner, &instance.instance_id)
            .await
            .unwrap();

        let err = sys
            .lifecycle
            .verify_ownership(&intruder, &instance.instance_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden), "{strategy:?}");

        let err = sys
            .lifecycle
            .verify_ownership(&owner, &"missing".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound), "{strategy:?}");
    }
}

#[tokio::test]
async fn allow_listed_image_names_are_exposed() {
    let sys = system(Strategy::Labels, true);
    let mut names = sys.lifecycle.image_names();
    names.sort();
    assert_eq!(names, vec!["hail", "hail-jupyter"]);
}

#[tokio::test]
async fn list_reflects_observed_readiness() {
    let sys = system(Strategy::Durable, true);
    let owner = OwnerId::new(U1);

    let instance = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();

    let listed = sys.lifecycle.list_instances(&owner).await.unwrap();
    assert_eq!(listed[0].state, InstanceState::Provisioning);

    sys.cluster.set_ready(&instance.compute_ref);
    let listed = sys.lifecycle.list_instances(&owner).await.unwrap();
    assert_eq!(listed[0].state, InstanceState::Running);
}
