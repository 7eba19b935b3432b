mod common;

use common::{engine, users_config};
use entity_repository::{MemoryEngine, RepositoryError, SortingParam, TypedRepository, UpdateConfig};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct NewUser {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<i64>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct User {
    user_id: i64,
    name: String,
    age: Option<i64>,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
struct UserUpdate {
    age: i64,
}

#[derive(Default, Serialize)]
struct UserFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

type Users = TypedRepository<MemoryEngine, NewUser, User, UserUpdate, UserFilters>;

fn new_user(name: &str, age: Option<i64>) -> NewUser {
    NewUser {
        name: name.to_string(),
        age,
    }
}

fn by_name(name: &str) -> UserFilters {
    UserFilters {
        name: Some(name.to_string()),
    }
}

#[tokio::test]
async fn typed_create_and_read_back() {
    let e = engine("pg");
    let users = Users::new(e.clone(), &users_config()).unwrap();

    let created = users.create(&new_user("ann", Some(30)), None).await.unwrap();
    let fetched = users.get_by_id(created.user_id, None).await.unwrap().unwrap();

    assert_eq!(created.user_id, 1);
    assert_eq!(created, fetched);
    assert_eq!(fetched.age, Some(30));
}

#[tokio::test]
async fn typed_bulk_and_filters() {
    let e = engine("mysql");
    let users = Users::new(e.clone(), &users_config()).unwrap();
    let rows = vec![new_user("a", None), new_user("b", Some(2)), new_user("a", Some(3))];

    let created = users.create_bulk(&rows, None, Some(2)).await.unwrap();
    assert_eq!(created.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(created[0].age, None);

    let all = users
        .get_by_criteria(Some(&UserFilters::default()), Some(&[SortingParam::desc("userId")][..]), None)
        .await
        .unwrap();
    assert_eq!(all.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![3, 2, 1]);

    let b = users.get_single_by_criteria(&by_name("b")).await.unwrap().unwrap();
    assert_eq!(b.age, Some(2));
    let err = users.get_single_by_criteria(&by_name("a")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NonUniqueResult { .. }));
}

#[tokio::test]
async fn typed_updates_and_deletes() {
    let e = engine("pg");
    let users = Users::new(e.clone(), &users_config()).unwrap();
    users
        .create_bulk_no_returning(&[new_user("a", Some(1)), new_user("b", Some(1))], None, None)
        .await
        .unwrap();

    let updated = users
        .update_by_id(1, &UserUpdate { age: 10 }, None, UpdateConfig::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.age, Some(10));

    let single = users
        .update_single_by_criteria(&by_name("b"), &UserUpdate { age: 20 }, None)
        .await
        .unwrap();
    assert_eq!(single.user_id, 2);

    let many = users
        .update_by_criteria(&UserFilters::default(), &UserUpdate { age: 0 }, None, None)
        .await
        .unwrap();
    assert_eq!(many.len(), 2);

    users.delete_by_criteria(&by_name("a"), None).await.unwrap();
    users.delete_by_id(2, None).await.unwrap();
    assert!(users.get_by_criteria(None, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn typed_transaction_round_trip() {
    let e = engine("pg");
    let users = Users::new(e.clone(), &users_config()).unwrap();
    users.create(&new_user("a", Some(1)), None).await.unwrap();

    let tx = users.create_transaction_provider();
    let locked = users.get_by_id_for_update(1, &tx).await.unwrap().unwrap();
    users
        .update_by_id(locked.user_id, &UserUpdate { age: 2 }, Some(&tx), UpdateConfig::default())
        .await
        .unwrap();
    users.commit_transaction(&tx).await.unwrap();

    let tx = users.create_transaction_provider();
    users.create(&new_user("b", None), Some(&tx)).await.unwrap();
    users.rollback_transaction(&tx).await.unwrap();

    let all = users.get_by_criteria(None, None, None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].age, Some(2));
    assert_eq!(users.untyped().config().table_name, "users");
}
