//! Integration tests for the label-derived ownership registry, which has
//! no store of its own and reads everything back off cluster metadata.

mod support;

use podbench::domain::OwnerId;
use podbench::error::Error;
use podbench::registry::OwnershipRegistry;
use support::{system, Strategy};

// Owner ids carry a `|` from the upstream identity provider, the character
// the label escaping exists for.
const U1: &str = "auth0|u1";
const U2: &str = "auth0|u2";

#[tokio::test]
async fn ownership_round_trips_through_labels() {
    let sys = system(Strategy::Labels, true);
    let owner = OwnerId::new(U1);

    let created = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();

    let found = sys.registry.find_instance(&created.instance_id).await.unwrap();
    assert_eq!(found.owner_id, owner);
    assert_eq!(found.instance_id, created.instance_id);
    assert_eq!(found.display_name, "nb1");
    assert_eq!(found.image_ref, "gcr.io/hail-vdc/hail:0.2.11");
    assert_eq!(found.access_token, created.access_token);

    let found_owner = sys.registry.find_owner(&created.instance_id).await.unwrap();
    assert_eq!(found_owner, owner);
}

#[tokio::test]
async fn active_lists_are_owner_scoped() {
    let sys = system(Strategy::Labels, true);
    let first = OwnerId::new(U1);
    let second = OwnerId::new(U2);

    sys.lifecycle
        .create_instance(&first, "hail", "a")
        .await
        .unwrap();
    sys.lifecycle
        .create_instance(&first, "hail-jupyter", "b")
        .await
        .unwrap();
    sys.lifecycle
        .create_instance(&second, "hail", "c")
        .await
        .unwrap();

    let firsts = sys.registry.list_active(&first).await.unwrap();
    assert_eq!(firsts.len(), 2);
    assert!(firsts.iter().all(|i| i.owner_id == first));

    let seconds = sys.registry.list_active(&second).await.unwrap();
    assert_eq!(seconds.len(), 1);
    assert_eq!(seconds[0].display_name, "c");
}

#[tokio::test]
async fn lookups_fail_once_the_resource_is_gone() {
    let sys = system(Strategy::Labels, true);
    let owner = OwnerId::new(U1);

    let created = sys
        .lifecycle
        .create_instance(&owner, "hail", "nb1")
        .await
        .unwrap();
    sys.lifecycle
        .delete_instance(&owner, &created.instance_id)
        .await
        .unwrap();

    let err = sys.registry.find_instance(&created.instance_id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound));
    assert!(sys.registry.list_active(&owner).await.unwrap().is_empty());
}
